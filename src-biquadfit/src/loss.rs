//! biquadfit - Parametric equalizer fitting
//! Loss function of the joint optimizer
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

use crate::constraints::FilterSpec;
use crate::iir::FilterKind;
use crate::read::nearest_index;
use crate::x2peq::x2peq;
use ndarray::{Array1, s};

/// Above this frequency only the average level is fitted (Hz)
pub const COLLAPSE_FREQ: f64 = 10000.0;
/// Lower edge of the loss band (Hz)
pub const LOSS_F_MIN: f64 = 20.0;
/// Upper edge of the loss band (Hz)
pub const LOSS_F_MAX: f64 = 20000.0;

/// Everything the loss needs that does not depend on the parameters.
#[derive(Debug, Clone)]
pub struct LossData {
    /// Optimizer grid (Hz)
    pub freqs: Array1<f64>,
    /// Target with the band above [`COLLAPSE_FREQ`] replaced by its mean
    pub target: Array1<f64>,
    /// Sample rate (Hz)
    pub srate: f64,
    /// First collapsed index
    pub ix10k: usize,
    /// Loss band, half open
    pub min_ix: usize,
    pub max_ix: usize,
}

impl LossData {
    /// Precompute the collapsed target and band indices.
    pub fn new(freqs: &Array1<f64>, target: &Array1<f64>, srate: f64) -> Self {
        let ix10k = nearest_index(freqs, COLLAPSE_FREQ);
        Self {
            freqs: freqs.clone(),
            target: collapse_tail(target, ix10k),
            srate,
            ix10k,
            min_ix: nearest_index(freqs, LOSS_F_MIN),
            max_ix: nearest_index(freqs, LOSS_F_MAX),
        }
    }

    /// Loss of the filters encoded in `x`.
    pub fn loss(&self, x: &[f64], specs: &[FilterSpec]) -> f64 {
        let peq = x2peq(x, specs, self.srate);
        let mut total = Array1::<f64>::zeros(self.freqs.len());
        let mut penalty = 0.0;
        for iir in &peq {
            let fr = iir.np_log_result(&self.freqs);
            if iir.kind == FilterKind::Peak {
                let coef = sharpness_coefficient(iir.db_gain, iir.q);
                penalty += fr.mapv(|v| (v * coef).powi(2)).mean().unwrap_or(0.0);
            }
            total += &fr;
        }
        let total = collapse_tail(&total, self.ix10k);

        let (lo, hi) = (self.min_ix, self.max_ix);
        let diff = &self.target.slice(s![lo..hi]) - &total.slice(s![lo..hi]);
        let mse = diff.mapv(|v| v * v).mean().unwrap_or(0.0);
        (mse + penalty).sqrt()
    }
}

/// Gain above which a peaking filter of quality `q` gets steeper than the
/// correction is allowed to be.
pub fn sharpness_gain_limit(q: f64) -> f64 {
    -0.09503189270199464 + 20.575128011847003 / q
}

/// Logistic gate: ~0 below the gain limit, ~1 above it.
///
/// The comparison is signed, so cuts never reach the gate.
pub fn sharpness_coefficient(gain: f64, q: f64) -> f64 {
    let limit = sharpness_gain_limit(q);
    if limit <= 0.0 {
        return 1.0;
    }
    let x = gain / limit - 1.0;
    1.0 / (1.0 + (-100.0 * x).exp())
}

fn collapse_tail(y: &Array1<f64>, from: usize) -> Array1<f64> {
    let mut out = y.clone();
    if from < y.len() {
        let mean = y.slice(s![from..]).mean().unwrap_or(0.0);
        out.slice_mut(s![from..]).fill(mean);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::FilterParams;
    use crate::read::generate_frequencies;
    use crate::x2peq::params2x;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn grid() -> Array1<f64> {
        generate_frequencies(20.0, 20000.0, 1.02)
    }

    #[test]
    fn zero_filters_on_zero_target() {
        let f = grid();
        let data = LossData::new(&f, &Array1::zeros(f.len()), 44100.0);
        let specs = [FilterSpec::new(FilterKind::Peak)];
        let x = params2x(&[FilterParams::new(FilterKind::Peak, 1000.0, 0.0, 1.0)]);
        assert!(data.loss(&x, &specs) < 1e-9);
    }

    #[test]
    fn constant_offset_is_the_loss() {
        let f = grid();
        let data = LossData::new(&f, &Array1::from_elem(f.len(), 2.0), 44100.0);
        let specs = [FilterSpec::new(FilterKind::LowShelf)];
        let x = params2x(&[FilterParams::new(FilterKind::LowShelf, 100.0, 0.0, 0.7)]);
        assert!(approx_eq(data.loss(&x, &specs), 2.0, 1e-9));
    }

    #[test]
    fn treble_detail_is_ignored() {
        let f = grid();
        // alternating +-3 dB above 10 kHz averages out
        let target = Array1::from_shape_fn(f.len(), |i| {
            if f[i] >= 10000.0 {
                if i % 2 == 0 { 3.0 } else { -3.0 }
            } else {
                0.0
            }
        });
        let data = LossData::new(&f, &target, 44100.0);
        let tail_mean = data.target[data.ix10k];
        assert!(data.target.slice(s![data.ix10k..]).iter().all(|&v| v == tail_mean));
        assert!(tail_mean.abs() <= 3.0);
    }

    #[test]
    fn band_indices() {
        let f = grid();
        let data = LossData::new(&f, &Array1::zeros(f.len()), 44100.0);
        assert_eq!(data.min_ix, 0);
        assert_eq!(data.max_ix, f.len() - 1);
        assert!((f[data.ix10k] / 10000.0).log2().abs() < 0.02);
    }

    #[test]
    fn sharpness_gate() {
        let q = 2.0;
        let limit = sharpness_gain_limit(q);
        assert!(approx_eq(limit, 10.192532, 1e-5));
        assert!(sharpness_coefficient(limit * 0.8, q) < 1e-6);
        assert!(approx_eq(sharpness_coefficient(limit, q), 0.5, 1e-12));
        assert!(sharpness_coefficient(limit * 1.2, q) > 1.0 - 1e-6);
        assert!(sharpness_coefficient(-limit * 1.2, q) < 1e-6);
    }

    #[test]
    fn deep_narrow_cut_is_not_gated() {
        assert!(approx_eq(sharpness_gain_limit(5.0), 4.0200, 1e-3));
        assert!(sharpness_coefficient(15.0, 5.0) > 1.0 - 1e-6);
        assert!(sharpness_coefficient(-15.0, 5.0) < 1e-6);
    }

    #[test]
    fn sharp_peaks_are_penalised() {
        let f = grid();
        let data = LossData::new(&f, &Array1::zeros(f.len()), 44100.0);
        let specs = [FilterSpec::new(FilterKind::Peak).with_q(0.1, 20.0)];
        let gentle = params2x(&[FilterParams::new(FilterKind::Peak, 1000.0, 3.0, 5.0)]);
        let sharp = params2x(&[FilterParams::new(FilterKind::Peak, 1000.0, 12.0, 5.0)]);
        let base = |gain: f64| {
            let fr = FilterParams::new(FilterKind::Peak, 1000.0, gain, 5.0)
                .to_biquad(44100.0)
                .np_log_result(&f);
            let d = fr.slice(s![data.min_ix..data.max_ix]).mapv(|v| v * v);
            d.mean().unwrap_or(0.0).sqrt()
        };
        assert!(approx_eq(data.loss(&gentle, &specs), base(3.0), 1e-3));
        assert!(data.loss(&sharp, &specs) > base(12.0) * 1.2);

        let cut = params2x(&[FilterParams::new(FilterKind::Peak, 1000.0, -12.0, 5.0)]);
        assert!(approx_eq(data.loss(&cut, &specs), base(-12.0), 1e-3));
    }
}
