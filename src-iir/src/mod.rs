//! Peaking and shelving biquad filters evaluated in the frequency domain.
//!
//! Only the magnitude response is needed by the fitter, so filters are never
//! run on samples: each [`Biquad`] keeps its normalized RBJ cookbook
//! coefficients and evaluates `|H(f)|` in dB through the real-valued identity
//! written in terms of `phi = 4·sin²(w/2)`.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Converts bandwidth in octaves to a Q factor.
pub fn bw2q(bw: f64) -> f64 {
    let two_pow_bw = 2.0_f64.powf(bw);
    two_pow_bw.sqrt() / (two_pow_bw - 1.0)
}

/// Converts a Q factor to bandwidth in octaves.
pub fn q2bw(q: f64) -> f64 {
    let q2 = (2.0 * q * q + 1.0) / (2.0 * q * q);
    (q2 + (q2 * q2 - 1.0).sqrt()).log(2.0)
}

/// Headroom (dB) kept below 0 dBFS when computing the preamp
pub const PREAMP_HEADROOM: f64 = 0.2;

/// Smallest power ratio fed to log10
const MIN_POWER_RATIO: f64 = 1.0e-20;

/// The filter shapes a fitted equalizer can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    /// Peaking (bell) filter
    #[serde(rename = "PEAKING", alias = "PK", alias = "Peaking")]
    Peak,
    /// Low-shelf filter
    #[serde(rename = "LOW_SHELF", alias = "LS", alias = "LSC", alias = "LSQ", alias = "LowShelf")]
    LowShelf,
    /// High-shelf filter
    #[serde(rename = "HIGH_SHELF", alias = "HS", alias = "HSC", alias = "HSQ", alias = "HighShelf")]
    HighShelf,
}

impl FilterKind {
    /// Short code used in result files (e.g. "PK", "LSQ").
    pub fn short_name(&self) -> &'static str {
        match self {
            FilterKind::Peak => "PK",
            FilterKind::LowShelf => "LSQ",
            FilterKind::HighShelf => "HSQ",
        }
    }

    /// Filter code understood by EqualizerAPO.
    pub fn apo_name(&self) -> &'static str {
        match self {
            FilterKind::Peak => "PK",
            FilterKind::LowShelf => "LSC",
            FilterKind::HighShelf => "HSC",
        }
    }

    /// Configuration name (e.g. "LOW_SHELF").
    pub fn long_name(&self) -> &'static str {
        match self {
            FilterKind::Peak => "PEAKING",
            FilterKind::LowShelf => "LOW_SHELF",
            FilterKind::HighShelf => "HIGH_SHELF",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

/// Returned when a filter type string is not one of the supported shapes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter type: {0}")]
pub struct UnknownFilterKind(pub String);

impl FromStr for FilterKind {
    type Err = UnknownFilterKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PEAKING" | "PEAK" | "PK" => Ok(FilterKind::Peak),
            "LOW_SHELF" | "LOWSHELF" | "LS" | "LSC" | "LSQ" => Ok(FilterKind::LowShelf),
            "HIGH_SHELF" | "HIGHSHELF" | "HS" | "HSC" | "HSQ" => Ok(FilterKind::HighShelf),
            _ => Err(UnknownFilterKind(s.to_string())),
        }
    }
}

/// A single second-order section, described by its design parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Biquad {
    /// The type of filter
    pub kind: FilterKind,
    /// Center (or shelf) frequency in Hz
    pub freq: f64,
    /// Sample rate in Hz
    pub srate: f64,
    /// Q factor
    pub q: f64,
    /// Gain in dB
    pub db_gain: f64,
    a1: f64,
    a2: f64,
    b0: f64,
    b1: f64,
    b2: f64,
}

impl Biquad {
    /// Creates a filter and computes its normalized coefficients.
    pub fn new(kind: FilterKind, freq: f64, srate: f64, q: f64, db_gain: f64) -> Self {
        // alpha = sin(w0)/(2q) blows up at q = 0
        let q = if q > 0.0 { q } else { 1.0e-2 };
        let mut biquad = Biquad {
            kind,
            freq,
            srate,
            q,
            db_gain,
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        };
        biquad.compute_coeffs();
        biquad
    }

    fn compute_coeffs(&mut self) {
        let a = 10.0_f64.powf(self.db_gain / 40.0);
        let w0 = 2.0 * PI * self.freq / self.srate;
        let sn = w0.sin();
        let cs = w0.cos();
        let alpha = sn / (2.0 * self.q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Peak => (
                1.0 + alpha * a,
                -2.0 * cs,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cs,
                1.0 - alpha / a,
            ),
            FilterKind::LowShelf => (
                a * ((a + 1.0) - (a - 1.0) * cs + two_sqrt_a_alpha),
                2.0 * a * ((a - 1.0) - (a + 1.0) * cs),
                a * ((a + 1.0) - (a - 1.0) * cs - two_sqrt_a_alpha),
                (a + 1.0) + (a - 1.0) * cs + two_sqrt_a_alpha,
                -2.0 * ((a - 1.0) + (a + 1.0) * cs),
                (a + 1.0) + (a - 1.0) * cs - two_sqrt_a_alpha,
            ),
            FilterKind::HighShelf => (
                a * ((a + 1.0) + (a - 1.0) * cs + two_sqrt_a_alpha),
                -2.0 * a * ((a - 1.0) + (a + 1.0) * cs),
                a * ((a + 1.0) + (a - 1.0) * cs - two_sqrt_a_alpha),
                (a + 1.0) - (a - 1.0) * cs + two_sqrt_a_alpha,
                2.0 * ((a - 1.0) - (a + 1.0) * cs),
                (a + 1.0) - (a - 1.0) * cs - two_sqrt_a_alpha,
            ),
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Magnitude response in dB at a single frequency.
    pub fn log_result(&self, f: f64) -> f64 {
        let phi = 4.0 * (PI * f / self.srate).sin().powi(2);
        let (b0, b1, b2) = (self.b0, self.b1, self.b2);
        let (a1, a2) = (self.a1, self.a2);

        let num = (b0 + b1 + b2).powi(2) + (b0 * b2 * phi - (b1 * (b0 + b2) + 4.0 * b0 * b2)) * phi;
        let den = (1.0 + a1 + a2).powi(2) + (a2 * phi - (a1 * (1.0 + a2) + 4.0 * a2)) * phi;

        10.0 * num.max(MIN_POWER_RATIO).log10() - 10.0 * den.max(MIN_POWER_RATIO).log10()
    }

    /// Magnitude response in dB over a frequency grid.
    pub fn np_log_result(&self, freq: &Array1<f64>) -> Array1<f64> {
        freq.mapv(|f| self.log_result(f))
    }
}

impl fmt::Display for Biquad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type:{},Freq:{:.1},Rate:{:.1},Q:{:.3},Gain:{:.2}",
            self.kind.short_name(),
            self.freq,
            self.srate,
            self.q,
            self.db_gain
        )
    }
}

/// A parametric equalizer: filters applied in series
pub type Peq = Vec<Biquad>;

/// Summed dB response of every filter in `peq` on the `freq` grid.
pub fn peq_spl(freq: &Array1<f64>, peq: &[Biquad]) -> Array1<f64> {
    let mut response = Array1::zeros(freq.len());
    for iir in peq {
        response += &iir.np_log_result(freq);
    }
    response
}

/// Preamp gain that keeps the boosted response `headroom` dB below 0 dBFS.
///
/// The value is `-max(response) - headroom` over `freq`, so a PEQ that only
/// cuts still gets a positive preamp.
pub fn peq_preamp_gain(freq: &Array1<f64>, peq: &[Biquad], headroom: f64) -> f64 {
    if freq.is_empty() {
        return -headroom;
    }
    let spl = peq_spl(freq, peq);
    let max = spl.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    -max - headroom
}

/// Format a PEQ as an EqualizerAPO `ParametricEQ.txt` document.
pub fn peq_format_apo(comment: &str, peq: &[Biquad], preamp: f64) -> String {
    let mut res = Vec::new();
    if !comment.is_empty() {
        res.push(comment.to_string());
    }
    res.push(format!("Preamp: {:.1} dB", preamp));

    for (i, iir) in peq.iter().enumerate() {
        res.push(format!(
            "Filter {}: ON {} Fc {:.0} Hz Gain {:.1} dB Q {:.2}",
            i + 1,
            iir.kind.apo_name(),
            iir.freq,
            iir.db_gain,
            iir.q
        ));
    }

    res.push(String::new());
    res.join("\n")
}
