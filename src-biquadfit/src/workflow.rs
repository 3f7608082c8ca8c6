//! biquadfit - Parametric equalizer fitting
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.
//!
//! Shared "workflow" helpers: the end-to-end fit used by the binary and by
//! JSON requests.

use std::io::Read;
use std::path::Path;

use crate::Curve;
use crate::constraints::{FilterParams, FilterSpec, PeqConfig};
use crate::equalize::Equalizer;
use crate::error::{FitError, Result};
use crate::iir::{PREAMP_HEADROOM, Peq, peq_format_apo, peq_preamp_gain, peq_spl};
use crate::init::init_filters;
use crate::optim::{StopReason, optimize};
use crate::read::{
    self, CENTER_FREQ, DEFAULT_BIQUAD_OPTIMIZATION_F_STEP, DEFAULT_F_MAX, DEFAULT_F_MIN, DEFAULT_STEP,
    FrPoint,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Default sample rate of the fitted biquads (Hz)
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Knobs of the pipeline that are not filter constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub sample_rate: f64,
    /// Grid ratio used while building the correction curve
    pub eq_step: f64,
    /// Grid ratio used by the optimizer
    pub optimizer_step: f64,
    pub f_min: f64,
    pub f_max: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            eq_step: DEFAULT_STEP,
            optimizer_step: DEFAULT_BIQUAD_OPTIMIZATION_F_STEP,
            f_min: DEFAULT_F_MIN,
            f_max: DEFAULT_F_MAX,
        }
    }
}

impl FitOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(FitError::config(format!(
                "sample rate must be > 0, got {}",
                self.sample_rate
            )));
        }
        if !(self.f_min > 0.0 && self.f_max > self.f_min) {
            return Err(FitError::config(format!(
                "invalid frequency range [{}, {}]",
                self.f_min, self.f_max
            )));
        }
        if !(self.eq_step > 1.0 && self.optimizer_step > 1.0) {
            return Err(FitError::config(format!(
                "grid steps must be > 1, got {} and {}",
                self.eq_step, self.optimizer_step
            )));
        }
        Ok(())
    }
}

/// Every curve of a fit, on the equalizer grid.
#[derive(Debug, Clone)]
pub struct FitCurves {
    /// Measurement, resampled and centered
    pub raw: Curve,
    /// Target, resampled and centered
    pub target: Curve,
    /// `raw - target`
    pub error: Curve,
    /// Correction curve the filters were fitted to
    pub equalization: Curve,
    /// Summed response of the fitted filters
    pub parametric_eq: Curve,
}

/// Outcome of [`fit`].
#[derive(Debug, Clone)]
pub struct FitResult {
    pub filters: Vec<FilterParams>,
    /// Preamp that keeps the boosted response below 0 dBFS (dB)
    pub pregain: f64,
    /// RMS distance between the corrected measurement and the target (dB)
    pub rmse: f64,
    /// Final optimizer loss
    pub loss: f64,
    pub iterations: usize,
    pub stop: StopReason,
    pub sample_rate: f64,
    pub curves: FitCurves,
}

/// One filter as written to JSON results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub freq: f64,
    pub gain: f64,
    pub q: f64,
}

/// JSON result document: `{filters, pregain, rmse}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub filters: Vec<FilterReport>,
    pub pregain: f64,
    pub rmse: f64,
}

impl FitResult {
    /// The fitted filters as biquads.
    pub fn peq(&self) -> Peq {
        self.filters
            .iter()
            .map(|f| f.to_biquad(self.sample_rate))
            .collect()
    }

    /// Rounded result document.
    pub fn report(&self) -> FitReport {
        FitReport {
            filters: self
                .filters
                .iter()
                .map(|f| FilterReport {
                    kind: f.kind.short_name().to_string(),
                    freq: round_to(f.fc, 2),
                    gain: round_to(f.gain, 4),
                    q: round_to(f.q, 4),
                })
                .collect(),
            pregain: round_to(self.pregain, 4),
            rmse: round_to(self.rmse, 6),
        }
    }

    /// EqualizerAPO `ParametricEQ.txt` text.
    pub fn to_apo(&self, comment: &str) -> String {
        peq_format_apo(comment, &self.peq(), self.pregain)
    }

    /// Write every curve of the fit as CSV columns.
    pub fn write_curves(&self, path: &Path) -> Result<()> {
        let c = &self.curves;
        read::write_curves_to_csv(
            path,
            &c.raw.freq,
            &[
                ("raw", &c.raw.spl),
                ("target", &c.target.spl),
                ("error", &c.error.spl),
                ("equalization", &c.equalization.spl),
                ("parametric_eq", &c.parametric_eq.spl),
            ],
        )
    }
}

/// A self-contained fit request: `{fr, target, config}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRequest {
    pub fr: Vec<FrPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<FrPoint>>,
    pub config: PeqConfig,
}

impl FitRequest {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read a request from `path`, or from stdin when `path` is `-`.
    pub fn from_path(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            Self::from_reader(std::io::stdin().lock())
        } else {
            Self::from_reader(std::io::BufReader::new(std::fs::File::open(path)?))
        }
    }

    pub fn run(&self, options: &FitOptions) -> Result<FitResult> {
        let measurement = read::curve_from_points(&self.fr);
        let target = self.target.as_deref().map(read::curve_from_points);
        let specs = self.config.resolve()?;
        fit(&measurement, target.as_ref(), &specs, options)
    }
}

/// Fit `specs` so that `measurement` follows `target` (flat when absent).
pub fn fit(
    measurement: &Curve,
    target: Option<&Curve>,
    specs: &[FilterSpec],
    options: &FitOptions,
) -> Result<FitResult> {
    fit_with(&Equalizer::new(), measurement, target, specs, options)
}

/// [`fit`] reusing an existing equalizer and its smoothing cache.
pub fn fit_with(
    equalizer: &Equalizer,
    measurement: &Curve,
    target: Option<&Curve>,
    specs: &[FilterSpec],
    options: &FitOptions,
) -> Result<FitResult> {
    options.validate()?;
    read::validate_curve(measurement)?;
    if let Some(t) = target {
        read::validate_curve(t)?;
    }
    if specs.is_empty() {
        return Err(FitError::config("no filters to fit"));
    }
    for spec in specs {
        spec.validate()?;
    }

    let prepare = |c: &Curve| {
        let resampled = read::resample(c, options.eq_step, options.f_min, options.f_max);
        read::center(&resampled, CENTER_FREQ)
    };
    let raw = prepare(measurement);
    let target = match target {
        Some(t) => prepare(t),
        None => Curve::zeros(&raw.freq),
    };
    let error = read::subtract(&raw, &target);
    log::info!("equalizing {} points", error.len());

    let equalization = equalizer.equalize(&error);
    let eq_coarse = read::resample(
        &equalization,
        options.optimizer_step,
        options.f_min,
        options.f_max,
    );

    let seeds = init_filters(&eq_coarse.freq, &eq_coarse.spl, specs, options.sample_rate);
    log::info!("optimizing {} filters", specs.len());
    let result = optimize(&seeds, specs, &eq_coarse.freq, &eq_coarse.spl, options.sample_rate);

    let peq: Peq = result
        .filters
        .iter()
        .map(|f| f.to_biquad(options.sample_rate))
        .collect();
    let parametric_eq = raw.with_spl(peq_spl(&raw.freq, &peq));
    let pregain = peq_preamp_gain(&raw.freq, &peq, PREAMP_HEADROOM);
    let rmse = rms(&(&raw.spl + &parametric_eq.spl - &target.spl));
    log::info!(
        "fit done: loss={:.4} rmse={:.4} pregain={:.2} ({} iterations, {})",
        result.loss,
        rmse,
        pregain,
        result.iterations,
        result.stop
    );

    Ok(FitResult {
        filters: result.filters,
        pregain,
        rmse,
        loss: result.loss,
        iterations: result.iterations,
        stop: result.stop,
        sample_rate: options.sample_rate,
        curves: FitCurves {
            raw,
            target,
            error,
            equalization,
            parametric_eq,
        },
    })
}

fn rms(v: &Array1<f64>) -> f64 {
    v.mapv(|x| x * x).mean().unwrap_or(0.0).sqrt()
}

/// Round half away from zero to `digits` decimals.
pub fn round_to(v: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (v * scale).round() / scale
}
