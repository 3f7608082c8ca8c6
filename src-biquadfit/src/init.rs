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
//! Sequential filter seeding.
//!
//! Filters are seeded one at a time against what the previous seeds left
//! over: shelves first (high, then low) so that broad tilts are taken out
//! before peaks are looked for, and inside a kind the filters with the
//! narrowest fc window go first.

use crate::constraints::{FilterParams, FilterSpec};
use crate::iir::{Biquad, FilterKind, bw2q};
use crate::peaks::{local_maxima, peak_prominences, peak_widths};
use ndarray::Array1;
use std::f64::consts::SQRT_2;

/// Lowest shelf frequency considered while seeding (Hz)
pub const SHELF_FC_MIN: f64 = 40.0;
/// Highest shelf frequency considered while seeding (Hz)
pub const SHELF_FC_MAX: f64 = 10000.0;
/// Q given to every shelf seed before clamping
pub const SHELF_Q: f64 = 0.7;

/// Seed every filter; the result is in the order of `specs`.
pub fn init_filters(
    freqs: &Array1<f64>,
    target: &Array1<f64>,
    specs: &[FilterSpec],
    srate: f64,
) -> Vec<FilterParams> {
    let mut order: Vec<usize> = (0..specs.len()).collect();
    order.sort_by(|&a, &b| {
        let key = |s: &FilterSpec| {
            let rank = match s.kind {
                FilterKind::HighShelf => 0,
                FilterKind::LowShelf => 1,
                FilterKind::Peak => 2,
            };
            (rank, s.fc_bounds.1 / s.fc_bounds.0)
        };
        let (ra, wa) = key(&specs[a]);
        let (rb, wb) = key(&specs[b]);
        ra.cmp(&rb).then(wa.total_cmp(&wb))
    });

    let mut remaining = target.clone();
    let mut seeded: Vec<Option<FilterParams>> = vec![None; specs.len()];
    for i in order {
        let params = init_filter(freqs, &remaining, &specs[i], srate);
        log::debug!(
            "seed {} #{}: fc={:.1} gain={:.2} q={:.3}",
            params.kind,
            i + 1,
            params.fc,
            params.gain,
            params.q
        );
        remaining -= &params.to_biquad(srate).np_log_result(freqs);
        seeded[i] = Some(params);
    }
    seeded.into_iter().flatten().collect()
}

/// Seed one filter against the `remaining` correction.
pub fn init_filter(
    freqs: &Array1<f64>,
    remaining: &Array1<f64>,
    spec: &FilterSpec,
    srate: f64,
) -> FilterParams {
    match spec.kind {
        FilterKind::Peak => init_peak(freqs, remaining, spec),
        FilterKind::LowShelf | FilterKind::HighShelf => init_shelf(freqs, remaining, spec, srate),
    }
}

struct Bump {
    index: usize,
    size: f64,
    left_ip: f64,
    right_ip: f64,
}

// biggest bump of `x` (already clipped to >= 0) inside [lo, hi]
fn largest_bump(x: &Array1<f64>, lo: usize, hi: usize) -> Option<Bump> {
    let candidates: Vec<usize> = local_maxima(x)
        .into_iter()
        .filter(|&i| i >= lo && i <= hi && x[i] > 0.0)
        .collect();
    let prominences = peak_prominences(x, &candidates);
    let widths = peak_widths(x, &prominences, 0.5);
    prominences
        .iter()
        .zip(widths.iter())
        .map(|(p, w)| Bump {
            index: p.index,
            size: x[p.index] * w.width,
            left_ip: w.left_ip,
            right_ip: w.right_ip,
        })
        .fold(None, |best: Option<Bump>, b| match best {
            Some(prev) if prev.size >= b.size => Some(prev),
            _ => Some(b),
        })
}

// frequency at a fractional grid position, log-linear between samples
fn freq_at(freqs: &Array1<f64>, pos: f64) -> f64 {
    let last = freqs.len() - 1;
    let pos = pos.clamp(0.0, last as f64);
    let i = (pos.floor() as usize).min(last.saturating_sub(1));
    if last == 0 {
        return freqs[0];
    }
    let t = pos - i as f64;
    freqs[i] * (freqs[i + 1] / freqs[i]).powf(t)
}

fn fc_window(freqs: &Array1<f64>, fc_min: f64, fc_max: f64) -> Option<(usize, usize)> {
    let lo = freqs.iter().position(|&f| f >= fc_min)?;
    let hi = freqs.iter().rposition(|&f| f <= fc_max)?;
    (lo <= hi).then_some((lo, hi))
}

fn init_peak(freqs: &Array1<f64>, remaining: &Array1<f64>, spec: &FilterSpec) -> FilterParams {
    let (fc_min, fc_max) = spec.fc_bounds;
    let fallback = spec.clamp(FilterParams::new(
        FilterKind::Peak,
        (fc_min * fc_max).sqrt(),
        0.0,
        SQRT_2,
    ));
    if freqs.len() < 3 {
        return fallback;
    }
    let Some((lo, hi)) = fc_window(freqs, fc_min, fc_max) else {
        return fallback;
    };

    let boosts = remaining.mapv(|v| v.max(0.0));
    let cuts = remaining.mapv(|v| (-v).max(0.0));
    let bump = match (largest_bump(&boosts, lo, hi), largest_bump(&cuts, lo, hi)) {
        (Some(b), Some(c)) => Some(if c.size > b.size { c } else { b }),
        (b, c) => b.or(c),
    };
    let Some(bump) = bump else {
        return fallback;
    };

    let bw = (freq_at(freqs, bump.right_ip) / freq_at(freqs, bump.left_ip)).log2();
    let q = if bw > 0.0 { bw2q(bw) } else { spec.q_bounds.1 };
    spec.clamp(FilterParams::new(
        FilterKind::Peak,
        freqs[bump.index],
        remaining[bump.index],
        q,
    ))
}

fn init_shelf(
    freqs: &Array1<f64>,
    remaining: &Array1<f64>,
    spec: &FilterSpec,
    srate: f64,
) -> FilterParams {
    let low = spec.kind == FilterKind::LowShelf;
    let fc_min = spec.fc_bounds.0.max(SHELF_FC_MIN);
    let fc_max = spec.fc_bounds.1.min(SHELF_FC_MAX);
    let n = freqs.len();

    let mut best: Option<(usize, f64)> = None;
    for (ix, &f) in freqs.iter().enumerate() {
        if f < fc_min || f > fc_max {
            continue;
        }
        let side = if low {
            remaining.slice(ndarray::s![..ix])
        } else {
            remaining.slice(ndarray::s![ix..])
        };
        if side.is_empty() {
            continue;
        }
        let level = side.mean().unwrap_or(0.0).abs();
        if best.is_none_or(|(_, b)| level > b) {
            best = Some((ix, level));
        }
    }
    let fc = match best {
        Some((ix, _)) => freqs[ix],
        None => (fc_min * fc_max).abs().sqrt(),
    };
    let q = SHELF_Q.clamp(spec.q_bounds.0, spec.q_bounds.1);

    // response shaped average: weight each point by a unit shelf
    let gain = if n == 0 {
        0.0
    } else {
        let weights = Biquad::new(spec.kind, fc, srate, q, 1.0)
            .np_log_result(freqs)
            .mapv(f64::abs);
        let denom = weights.sum();
        if denom > 0.0 {
            (remaining * &weights).sum() / denom
        } else {
            0.0
        }
    };

    spec.clamp(FilterParams::new(spec.kind, fc, gain, q))
}
