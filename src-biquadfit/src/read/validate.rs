use crate::Curve;
use crate::error::{FitError, Result};

/// Reject curves the numeric core cannot work with.
///
/// A valid curve is non-empty, has matching columns, finite values, and
/// strictly increasing positive frequencies.
pub fn validate_curve(curve: &Curve) -> Result<()> {
    if curve.freq.is_empty() {
        return Err(FitError::input("curve is empty"));
    }
    if curve.freq.len() != curve.spl.len() {
        return Err(FitError::input(format!(
            "curve has {} frequencies but {} levels",
            curve.freq.len(),
            curve.spl.len()
        )));
    }
    for (i, (&f, &v)) in curve.freq.iter().zip(curve.spl.iter()).enumerate() {
        if !f.is_finite() || f <= 0.0 {
            return Err(FitError::input(format!(
                "frequency at index {} must be finite and > 0, got {}",
                i, f
            )));
        }
        if !v.is_finite() {
            return Err(FitError::input(format!(
                "level at index {} ({} Hz) is not finite",
                i, f
            )));
        }
        if i > 0 && f <= curve.freq[i - 1] {
            return Err(FitError::input(format!(
                "frequencies must be strictly increasing: {} Hz follows {} Hz",
                f,
                curve.freq[i - 1]
            )));
        }
    }
    Ok(())
}
