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
//! Fractional-octave smoothing by local quadratic regression
//! (Savitzky-Golay, order 2) on a log-spaced grid.
//!
//! Interior points use the usual convolution. The first and last half
//! windows are evaluated on the quadratic fitted to the first / last full
//! window, so edges are neither mirrored nor zero padded.

use crate::Curve;
use crate::read::average_step;
use ndarray::{Array1, Array2};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Start of the band where the normal window fades out (Hz)
pub const TREBLE_F_LOWER: f64 = 6000.0;
/// End of the band where the treble window takes over (Hz)
pub const TREBLE_F_UPPER: f64 = 8000.0;

/// Quadratic regression weights for one window length.
///
/// Row `r` holds the weights that evaluate the fitted quadratic at window
/// offset `r - (n - 1) / 2`; the middle row is the convolution kernel.
pub type SavgolWeights = Array2<f64>;

/// Smoother owning a cache of regression weights keyed by window length.
///
/// Entries are pure functions of the key, so concurrent readers always see
/// consistent weights.
#[derive(Debug, Default)]
pub struct Smoother {
    cache: RwLock<HashMap<usize, Arc<SavgolWeights>>>,
}

impl Smoother {
    /// An empty smoother.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of window lengths computed so far.
    pub fn cached_windows(&self) -> usize {
        self.cache.read().len()
    }

    /// Weights for an odd window length `n >= 3`, computed once.
    pub fn weights(&self, n: usize) -> Arc<SavgolWeights> {
        if let Some(w) = self.cache.read().get(&n) {
            return Arc::clone(w);
        }
        let computed = Arc::new(savgol_weights(n));
        let mut cache = self.cache.write();
        Arc::clone(cache.entry(n).or_insert(computed))
    }

    /// Smooth `curve` with a window `window_octaves` wide.
    ///
    /// Returns a curve on the same grid. Curves shorter than three points
    /// are returned unchanged.
    pub fn smooth(&self, curve: &Curve, window_octaves: f64) -> Curve {
        let len = curve.len();
        if len < 3 {
            return curve.clone();
        }
        let mut n = window_size(&curve.freq, window_octaves);
        if n > len {
            n = if len % 2 == 1 { len } else { len - 1 };
        }
        let w = self.weights(n);
        curve.with_spl(apply_weights(&curve.spl, &w))
    }

    /// Smooth with a fine window below 6 kHz and a coarse one above 8 kHz.
    ///
    /// Both smoothings are blended with a logistic weight centered on the
    /// geometric middle of the transition band.
    pub fn two_zone_smooth(&self, curve: &Curve, normal_octaves: f64, treble_octaves: f64) -> Curve {
        let normal = self.smooth(curve, normal_octaves);
        let treble = if treble_octaves == normal_octaves {
            normal.clone()
        } else {
            self.smooth(curve, treble_octaves)
        };
        let k_treble = treble_weight(&curve.freq, TREBLE_F_LOWER, TREBLE_F_UPPER);
        let k_normal = k_treble.mapv(|k| 1.0 - k);
        curve.with_spl(&normal.spl * &k_normal + &treble.spl * &k_treble)
    }
}

/// Odd number of samples (at least 3) spanning `octaves` on the grid.
pub fn window_size(freq: &Array1<f64>, octaves: f64) -> usize {
    let step = average_step(freq);
    if step <= 1.0 {
        return 3;
    }
    let n = (2f64.powf(octaves).ln() / step.ln()).round().max(0.0) as usize;
    let n = if n % 2 == 0 { n + 1 } else { n };
    n.max(3)
}

/// Logistic transition weight: ~0 below `f_lower`, ~1 above `f_upper`.
pub fn treble_weight(freq: &Array1<f64>, f_lower: f64, f_upper: f64) -> Array1<f64> {
    let f_center = (f_upper * f_lower).sqrt();
    let half_range = f_upper.log10() - f_center.log10();
    let log_center = f_center.log10();
    freq.mapv(|f| sigmoid((f.log10() - log_center) / (half_range / 4.0)))
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn savgol_weights(n: usize) -> SavgolWeights {
    debug_assert!(n >= 3 && n % 2 == 1);
    let m = (n / 2) as f64;
    let offsets: Vec<f64> = (0..n).map(|j| j as f64 - m).collect();

    // normal equations of the centered Vandermonde [1, k, k^2]
    let s0 = n as f64;
    let s2: f64 = offsets.iter().map(|k| k * k).sum();
    let s4: f64 = offsets.iter().map(|k| k.powi(4)).sum();
    let normal = [[s0, 0.0, s2], [0.0, s2, 0.0], [s2, 0.0, s4]];
    let inv = invert3(&normal);

    Array2::from_shape_fn((n, n), |(r, j)| {
        let t = offsets[r];
        let k = offsets[j];
        let at = [1.0, t, t * t];
        let ak = [1.0, k, k * k];
        let mut acc = 0.0;
        for a in 0..3 {
            for b in 0..3 {
                acc += at[a] * inv[a][b] * ak[b];
            }
        }
        acc
    })
}

fn invert3(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    let inv_det = 1.0 / det;
    [
        [
            c00 * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            c01 * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            c02 * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn apply_weights(y: &Array1<f64>, w: &SavgolWeights) -> Array1<f64> {
    let len = y.len();
    let n = w.nrows();
    let m = n / 2;
    let mut out = Array1::zeros(len);

    let dot = |row: usize, start: usize| -> f64 {
        let mut acc = 0.0;
        for j in 0..n {
            acc += w[[row, j]] * y[start + j];
        }
        acc
    };

    for i in 0..m {
        out[i] = dot(i, 0);
    }
    for i in m..len - m {
        out[i] = dot(m, i - m);
    }
    let tail_start = len - n;
    for i in len - m..len {
        out[i] = dot(i - tail_start, tail_start);
    }
    out
}
