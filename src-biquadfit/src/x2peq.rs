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

use crate::constraints::{FilterParams, FilterSpec};
use crate::iir::{Peq, peq_spl};
use ndarray::Array1;

/// Number of optimizer parameters per filter
pub const PARAMS_PER_FILTER: usize = 3;

/// Flatten filters into `[log10(fc), q, gain]` triplets.
pub fn params2x(filters: &[FilterParams]) -> Vec<f64> {
    let mut x = Vec::with_capacity(filters.len() * PARAMS_PER_FILTER);
    for f in filters {
        x.push(f.fc.log10());
        x.push(f.q);
        x.push(f.gain);
    }
    x
}

/// Rebuild filters from a parameter vector; kinds come from `specs`.
///
/// # Arguments
/// * `x` - Parameter vector with triplets [log10(freq), Q, gain] for each filter
/// * `specs` - One spec per triplet, in the same order
pub fn x2params(x: &[f64], specs: &[FilterSpec]) -> Vec<FilterParams> {
    debug_assert_eq!(x.len(), specs.len() * PARAMS_PER_FILTER);
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| FilterParams {
            kind: spec.kind,
            // undo the log10 round trip at the bounds
            fc: 10f64
                .powf(x[i * 3])
                .max(spec.fc_bounds.0)
                .min(spec.fc_bounds.1),
            q: x[i * 3 + 1],
            gain: x[i * 3 + 2],
        })
        .collect()
}

/// Convert a parameter vector to biquads at `srate`.
pub fn x2peq(x: &[f64], specs: &[FilterSpec], srate: f64) -> Peq {
    x2params(x, specs)
        .iter()
        .map(|p| p.to_biquad(srate))
        .collect()
}

/// Summed response (dB) of the filters encoded in `x`.
pub fn x2spl(freqs: &Array1<f64>, x: &[f64], specs: &[FilterSpec], srate: f64) -> Array1<f64> {
    peq_spl(freqs, &x2peq(x, specs, srate))
}

/// Lower and upper bounds of the parameter vector.
pub fn bounds(specs: &[FilterSpec]) -> (Vec<f64>, Vec<f64>) {
    let mut lower = Vec::with_capacity(specs.len() * PARAMS_PER_FILTER);
    let mut upper = Vec::with_capacity(specs.len() * PARAMS_PER_FILTER);
    for s in specs {
        lower.extend([s.fc_bounds.0.log10(), s.q_bounds.0, s.gain_bounds.0]);
        upper.extend([s.fc_bounds.1.log10(), s.q_bounds.1, s.gain_bounds.1]);
    }
    (lower, upper)
}

/// Clamp every component of `x` into `[lower, upper]` in place.
pub fn clip(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, &lo), &hi) in x.iter_mut().zip(lower).zip(upper) {
        *v = v.max(lo).min(hi);
    }
}
