//! Peak and dip detection.
//!
//! Local maxima, prominences and interpolated widths follow the usual
//! scanning conventions: plateaus resolve to their midpoint, prominence is
//! measured against the higher of the two bounding minima, and widths are
//! measured between linearly interpolated crossings.

use ndarray::Array1;

/// Prominence of one peak and the bases that bound it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prominence {
    /// Index of the peak
    pub index: usize,
    /// Height above the higher of the two bounding minima
    pub prominence: f64,
    /// Index of the minimum on the left side
    pub left_base: usize,
    /// Index of the minimum on the right side
    pub right_base: usize,
}

/// Width of a peak measured at a reference height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakWidth {
    /// Width in samples (fractional)
    pub width: f64,
    /// Height at which the width was measured
    pub width_height: f64,
    /// Interpolated left crossing position
    pub left_ip: f64,
    /// Interpolated right crossing position
    pub right_ip: f64,
}

/// Indices of the local maxima of `x`, ascending.
///
/// A maximum is strictly higher than its left neighbour and, after any flat
/// run, strictly higher than the next sample. Flat runs report their middle
/// index (rounded down). End points are never maxima.
pub fn local_maxima(x: &Array1<f64>) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let i_max = n - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut i_ahead = i + 1;
            while i_ahead < i_max && x[i_ahead] == x[i] {
                i_ahead += 1;
            }
            if x[i_ahead] < x[i] {
                let left_edge = i;
                let right_edge = i_ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = i_ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Prominence of every peak in `peaks`.
pub fn peak_prominences(x: &Array1<f64>, peaks: &[usize]) -> Vec<Prominence> {
    let n = x.len();
    peaks
        .iter()
        .map(|&peak| {
            let h = x[peak];

            let mut left_min = h;
            let mut left_base = peak;
            let mut i = peak as isize;
            while i >= 0 && x[i as usize] <= h {
                if x[i as usize] < left_min {
                    left_min = x[i as usize];
                    left_base = i as usize;
                }
                i -= 1;
            }

            let mut right_min = h;
            let mut right_base = peak;
            let mut i = peak;
            while i < n && x[i] <= h {
                if x[i] < right_min {
                    right_min = x[i];
                    right_base = i;
                }
                i += 1;
            }

            Prominence {
                index: peak,
                prominence: h - left_min.max(right_min),
                left_base,
                right_base,
            }
        })
        .collect()
}

/// Width of each peak at `rel_height` of its prominence below the top.
pub fn peak_widths(x: &Array1<f64>, prominences: &[Prominence], rel_height: f64) -> Vec<PeakWidth> {
    prominences
        .iter()
        .map(|p| {
            let peak = p.index;
            let height = x[peak] - p.prominence * rel_height;

            let mut i = peak;
            while p.left_base < i && height < x[i] {
                i -= 1;
            }
            let mut left_ip = i as f64;
            if x[i] < height {
                left_ip += (height - x[i]) / (x[i + 1] - x[i]);
            }

            let mut i = peak;
            while i < p.right_base && height < x[i] {
                i += 1;
            }
            let mut right_ip = i as f64;
            if x[i] < height {
                right_ip -= (height - x[i]) / (x[i - 1] - x[i]);
            }

            PeakWidth {
                width: right_ip - left_ip,
                width_height: height,
                left_ip,
                right_ip,
            }
        })
        .collect()
}

/// Local maxima whose prominence is at least `min_prominence`.
pub fn find_peaks(x: &Array1<f64>, min_prominence: f64) -> Vec<usize> {
    let candidates = local_maxima(x);
    peak_prominences(x, &candidates)
        .into_iter()
        .filter(|p| p.prominence >= min_prominence)
        .map(|p| p.index)
        .collect()
}

/// Local minima of `x` with at least `min_prominence` depth.
pub fn find_dips(x: &Array1<f64>, min_prominence: f64) -> Vec<usize> {
    find_peaks(&x.mapv(|v| -v), min_prominence)
}
