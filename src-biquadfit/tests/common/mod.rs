//! Shared curve builders for the integration tests.
#![allow(dead_code)]

use biquadfit::Curve;
use biquadfit::iir::{Biquad, FilterKind};
use biquadfit::read::{DEFAULT_BIQUAD_OPTIMIZATION_F_STEP, DEFAULT_STEP, generate_frequencies, nearest_index};
use ndarray::Array1;

pub const SRATE: f64 = 44100.0;

/// 20 Hz - 20 kHz grid used for correction curves
pub fn eq_grid() -> Array1<f64> {
    generate_frequencies(20.0, 20000.0, DEFAULT_STEP)
}

/// 20 Hz - 20 kHz grid used by the optimizer
pub fn opt_grid() -> Array1<f64> {
    generate_frequencies(20.0, 20000.0, DEFAULT_BIQUAD_OPTIMIZATION_F_STEP)
}

pub fn flat(freq: &Array1<f64>, level: f64) -> Curve {
    Curve::new(freq.clone(), Array1::from_elem(freq.len(), level))
}

/// 0 dB everywhere except `level` at the grid point nearest `f0`
pub fn spike(freq: &Array1<f64>, f0: f64, level: f64) -> Curve {
    let mut spl = Array1::zeros(freq.len());
    spl[nearest_index(freq, f0)] = level;
    Curve::new(freq.clone(), spl)
}

/// `level` inside [lo, hi] Hz, 0 dB elsewhere
pub fn band(freq: &Array1<f64>, lo: f64, hi: f64, level: f64) -> Curve {
    Curve::new(
        freq.clone(),
        freq.mapv(|f| if f >= lo && f <= hi { level } else { 0.0 }),
    )
}

/// Response of a few filters on `freq`
pub fn filtered(freq: &Array1<f64>, filters: &[(FilterKind, f64, f64, f64)]) -> Curve {
    let mut spl = Array1::zeros(freq.len());
    for &(kind, fc, gain, q) in filters {
        spl += &Biquad::new(kind, fc, SRATE, q, gain).np_log_result(freq);
    }
    Curve::new(freq.clone(), spl)
}

/// A plausible in-ear measurement: bass lift, 3 kHz ear gain, 8 kHz resonance
pub fn iem_like(freq: &Array1<f64>) -> Curve {
    filtered(
        freq,
        &[
            (FilterKind::LowShelf, 105.0, 6.0, 0.7),
            (FilterKind::Peak, 3000.0, 8.0, 1.2),
            (FilterKind::Peak, 8000.0, 6.0, 4.0),
            (FilterKind::Peak, 250.0, -2.0, 1.0),
        ],
    )
}

/// Sparse measurement as a device would export it (about 1/3 octave)
pub fn sparse(curve: &Curve, step: f64) -> Curve {
    let freq = generate_frequencies(20.0, 20000.0, step);
    let spl = biquadfit::read::interpolate_log_space(curve, &freq);
    Curve::new(freq, spl)
}
