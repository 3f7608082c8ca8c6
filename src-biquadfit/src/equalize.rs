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
//! Correction curve synthesis.
//!
//! The error curve (measurement minus target) is smoothed, negated, and its
//! boosts are slope limited from both sides so that narrow dips in the
//! measurement are not chased with narrow, loud filters. Cuts are never
//! capped; boosts are capped at [`MAX_GAIN`].

use crate::Curve;
use crate::peaks::{find_dips, find_peaks};
use crate::smooth::Smoother;
use ndarray::Array1;
use std::ops::Range;

/// Largest rising slope kept in the correction (dB / octave)
pub const MAX_SLOPE: f64 = 18.0;
/// Largest boost kept in the correction (dB)
pub const MAX_GAIN: f64 = 6.0;
/// Minimum prominence for a peak or dip to count as a feature (dB)
pub const FEATURE_PROMINENCE: f64 = 1.0;
/// Smoothing window below the treble transition (octaves)
pub const SMOOTHING_WINDOW: f64 = 1.0 / 12.0;
/// Smoothing window above the treble transition (octaves)
pub const TREBLE_SMOOTHING_WINDOW: f64 = 2.0;
/// Window used to round off the limiter's kinks (octaves)
pub const RESMOOTH_WINDOW: f64 = 1.0 / 5.0;

/// Output of one slope limiting pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeLimit {
    /// The limited curve
    pub limited: Array1<f64>,
    /// Which samples were clipped
    pub clipped: Vec<bool>,
    /// Clipped regions that were kept, as index ranges of the input
    pub regions: Vec<Range<usize>>,
}

/// Every intermediate of [`Equalizer::equalize_detailed`].
#[derive(Debug, Clone)]
pub struct Equalization {
    /// Two-zone smoothed error
    pub smoothed: Curve,
    /// Negated smoothed error, before limiting
    pub correction: Curve,
    /// Peak indices of the correction
    pub peaks: Vec<usize>,
    /// Dip indices of the correction
    pub dips: Vec<usize>,
    /// Samples exempt from slope limiting
    pub limit_free: Vec<bool>,
    /// First index handled by the right-to-left pass
    pub rtl_start: usize,
    /// Left-to-right pass
    pub ltr: Option<SlopeLimit>,
    /// Right-to-left pass
    pub rtl: Option<SlopeLimit>,
    /// Final correction curve handed to the optimizer
    pub equalization: Curve,
}

/// Builds correction curves; owns the smoother and its weight cache.
#[derive(Debug, Default)]
pub struct Equalizer {
    smoother: Smoother,
}

impl Equalizer {
    /// A new equalizer with an empty smoothing cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The smoother used by this equalizer.
    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    /// Correction curve for `error` on the same grid.
    pub fn equalize(&self, error: &Curve) -> Curve {
        self.equalize_detailed(error).equalization
    }

    /// Correction curve for `error`, with every intermediate step.
    pub fn equalize_detailed(&self, error: &Curve) -> Equalization {
        let smoothed =
            self.smoother
                .two_zone_smooth(error, SMOOTHING_WINDOW, TREBLE_SMOOTHING_WINDOW);
        let y = smoothed.spl.mapv(|v| -v);
        let correction = smoothed.with_spl(y.clone());
        let n = y.len();

        let peaks = find_peaks(&y, FEATURE_PROMINENCE);
        let dips = find_dips(&y, FEATURE_PROMINENCE);
        log::debug!("equalize: {} peaks, {} dips", peaks.len(), dips.len());

        if peaks.is_empty() && dips.is_empty() {
            return Equalization {
                smoothed,
                equalization: correction.clone(),
                correction,
                peaks,
                dips,
                limit_free: vec![false; n],
                rtl_start: n.saturating_sub(1),
                ltr: None,
                rtl: None,
            };
        }

        let limit_free = protection_mask(&y, &peaks, &dips);
        let rtl_start = rtl_start(&y, &peaks, &dips);

        let mut features: Vec<usize> = peaks.iter().chain(dips.iter()).copied().collect();
        features.sort_unstable();

        let ltr = limited_slope(&error.freq, &y, MAX_SLOPE, 0, &features, &limit_free);
        let rtl = limited_rtl_slope(&error.freq, &y, MAX_SLOPE, rtl_start, &features, &limit_free);

        let combined = Array1::from_shape_fn(n, |i| ltr.limited[i].min(rtl.limited[i]).min(MAX_GAIN));
        let equalization = self.smoother.two_zone_smooth(
            &error.with_spl(combined),
            RESMOOTH_WINDOW,
            RESMOOTH_WINDOW,
        );

        Equalization {
            smoothed,
            correction,
            peaks,
            dips,
            limit_free,
            rtl_start,
            ltr: Some(ltr),
            rtl: Some(rtl),
            equalization,
        }
    }
}

/// True when the right-most significant feature is a peak.
pub fn last_feature_is_peak(peaks: &[usize], dips: &[usize]) -> bool {
    match (peaks.last(), dips.last()) {
        (Some(_), None) => true,
        (Some(p), Some(d)) => p > d,
        _ => false,
    }
}

/// Samples exempt from slope limiting.
///
/// The dip list is extended with a trailing entry (the minimum after the
/// last peak when the curve ends on a peak, otherwise a virtual dip at the
/// global minimum level). Around every interior dip the span reaching up to
/// the neighbouring dips' levels is marked limit free, inclusive on both
/// ends.
pub fn protection_mask(y: &Array1<f64>, peaks: &[usize], dips: &[usize]) -> Vec<bool> {
    let n = y.len();
    let mut mask = vec![false; n];
    if n == 0 {
        return mask;
    }

    let mut levels: Vec<f64> = dips.iter().map(|&d| y[d]).collect();
    let mut indices: Vec<usize> = dips.to_vec();
    if last_feature_is_peak(peaks, dips) {
        // peaks is non-empty here
        let last_peak = peaks[peaks.len() - 1];
        let ix = argmin_from(y, last_peak);
        indices.push(ix);
        levels.push(y[ix]);
    } else {
        // virtual dip, only its level is ever read
        indices.push(n - 1);
        levels.push(y.iter().cloned().fold(f64::INFINITY, f64::min));
    }

    if indices.len() < 3 {
        return mask;
    }

    for i in 1..indices.len() - 1 {
        let dip = indices[i];
        let target_left = levels[i - 1];
        let target_right = levels[i + 1];

        let mut left = dip;
        while left > 0 && y[left] < target_left {
            left -= 1;
        }
        let mut right = dip;
        while right < n - 1 && y[right] < target_right {
            right += 1;
        }
        for m in &mut mask[left..=right] {
            *m = true;
        }
    }
    mask
}

/// Index where the right-to-left limiter starts.
///
/// When the curve ends on a peak this is the first sample after that peak
/// that falls to the last dip's level (or to the higher end point when
/// there are no dips); otherwise it is the last dip.
pub fn rtl_start(y: &Array1<f64>, peaks: &[usize], dips: &[usize]) -> usize {
    let n = y.len();
    if last_feature_is_peak(peaks, dips) {
        let last_peak = peaks[peaks.len() - 1];
        let level = match dips.last() {
            Some(&d) => y[d],
            None => y[0].max(y[n - 1]),
        };
        (last_peak..n).find(|&i| y[i] <= level).unwrap_or(n - 1)
    } else {
        dips.last().copied().unwrap_or(n.saturating_sub(1))
    }
}

/// Limit rising slopes of `y` to `max_slope` dB/octave, walking left to right.
///
/// Samples up to and including `start` are copied. Each slope is measured
/// from the previous *limited* value, so a clipped run keeps climbing at
/// `max_slope` until the curve comes back below it. When a run ends it is
/// kept only if it covers one of `features`; otherwise the original values
/// are restored. A run still open at the end is closed at the last index
/// and validated the same way.
pub fn limited_slope(
    freq: &Array1<f64>,
    y: &Array1<f64>,
    max_slope: f64,
    start: usize,
    features: &[usize],
    limit_free: &[bool],
) -> SlopeLimit {
    let n = y.len();
    let mut limited: Vec<f64> = Vec::with_capacity(n);
    let mut clipped: Vec<bool> = Vec::with_capacity(n);
    let mut regions: Vec<Range<usize>> = Vec::new();
    let mut open: Option<usize> = None;

    for i in 0..n {
        if i <= start {
            limited.push(y[i]);
            clipped.push(false);
            continue;
        }
        let octaves = (freq[i] / freq[i - 1]).log2().abs();
        let previous = limited[i - 1];
        let slope = (y[i] - previous) / octaves;

        if slope > max_slope && !limit_free[i] {
            open.get_or_insert(i);
            clipped.push(true);
            limited.push(previous + max_slope * octaves);
        } else {
            limited.push(y[i]);
            clipped.push(false);
            if let Some(region_start) = open.take() {
                settle_region(
                    region_start..i,
                    i,
                    features,
                    y,
                    &mut limited,
                    &mut clipped,
                    &mut regions,
                );
            }
        }
    }
    if let Some(region_start) = open {
        // closed at the last index; the last sample is still restored with it
        settle_region(
            region_start..n - 1,
            n,
            features,
            y,
            &mut limited,
            &mut clipped,
            &mut regions,
        );
    }

    SlopeLimit {
        limited: Array1::from_vec(limited),
        clipped,
        regions,
    }
}

/// [`limited_slope`] walking right to left, starting at `start`.
///
/// Implemented on reversed copies; the result is mapped back to the input's
/// index order.
pub fn limited_rtl_slope(
    freq: &Array1<f64>,
    y: &Array1<f64>,
    max_slope: f64,
    start: usize,
    features: &[usize],
    limit_free: &[bool],
) -> SlopeLimit {
    let n = y.len();
    if n == 0 {
        return limited_slope(freq, y, max_slope, start, features, limit_free);
    }
    let rev = |a: &Array1<f64>| a.iter().rev().copied().collect::<Array1<f64>>();
    let freq_r = rev(freq);
    let y_r = rev(y);
    let mask_r: Vec<bool> = limit_free.iter().rev().copied().collect();
    let features_r: Vec<usize> = features.iter().map(|&f| n - f - 1).collect();

    let SlopeLimit {
        limited,
        mut clipped,
        regions,
    } = limited_slope(&freq_r, &y_r, max_slope, n - start - 1, &features_r, &mask_r);

    clipped.reverse();
    let mut regions: Vec<Range<usize>> = regions.into_iter().map(|r| (n - r.end)..(n - r.start)).collect();
    regions.reverse();

    SlopeLimit {
        limited: rev(&limited),
        clipped,
        regions,
    }
}

/// Keep `region` if it covers a feature, otherwise restore `region.start..end`.
fn settle_region(
    region: Range<usize>,
    end: usize,
    features: &[usize],
    y: &Array1<f64>,
    limited: &mut [f64],
    clipped: &mut [bool],
    regions: &mut Vec<Range<usize>>,
) {
    if features.iter().any(|f| region.contains(f)) {
        regions.push(region);
    } else {
        log::trace!("slope region {:?} has no feature, restored", region);
        for j in region.start..end {
            limited[j] = y[j];
            clipped[j] = false;
        }
    }
}

fn argmin_from(y: &Array1<f64>, from: usize) -> usize {
    let mut best = from;
    for i in from..y.len() {
        if y[i] < y[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::generate_frequencies;

    fn grid(n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| 100.0 * 1.01f64.powi(i as i32))
    }

    // piecewise linear curve through (index, level) control points
    fn piecewise(n: usize, points: &[(usize, f64)]) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| {
            for w in points.windows(2) {
                let (i0, y0) = w[0];
                let (i1, y1) = w[1];
                if i >= i0 && i <= i1 {
                    return y0 + (y1 - y0) * (i - i0) as f64 / (i1 - i0) as f64;
                }
            }
            0.0
        })
    }

    fn three_dips() -> (Array1<f64>, Vec<usize>, Vec<usize>) {
        let y = piecewise(
            100,
            &[(0, 0.0), (20, -2.0), (35, 4.0), (50, -8.0), (65, 4.0), (80, -3.0), (99, 0.0)],
        );
        (y, vec![35, 65], vec![20, 50, 80])
    }

    #[test]
    fn last_feature_detection() {
        assert!(last_feature_is_peak(&[5], &[]));
        assert!(last_feature_is_peak(&[5, 30], &[10]));
        assert!(!last_feature_is_peak(&[5], &[10]));
        assert!(!last_feature_is_peak(&[], &[10]));
        assert!(!last_feature_is_peak(&[], &[]));
    }

    #[test]
    fn protection_mask_covers_deep_middle_dip() {
        let (y, peaks, dips) = three_dips();
        let mask = protection_mask(&y, &peaks, &dips);
        let marked: Vec<usize> = (0..100).filter(|&i| mask[i]).collect();
        let mut expected: Vec<usize> = (42..=57).collect();
        expected.push(80);
        assert_eq!(marked, expected);
    }

    #[test]
    fn protection_mask_needs_three_entries() {
        let (y, _, _) = three_dips();
        let mask = protection_mask(&y, &[35], &[20]);
        assert!(mask.iter().all(|m| !m));
    }

    #[test]
    fn limiter_respects_protection_mask() {
        let (y, peaks, dips) = three_dips();
        let freq = grid(100);
        let mask = protection_mask(&y, &peaks, &dips);
        let mut features: Vec<usize> = peaks.iter().chain(dips.iter()).copied().collect();
        features.sort_unstable();

        let protected = limited_slope(&freq, &y, MAX_SLOPE, 0, &features, &mask);
        for i in 42..=57 {
            assert!(!protected.clipped[i], "index {} clipped", i);
            assert_eq!(protected.limited[i], y[i]);
        }

        // the same rise is clipped without protection
        let unprotected = limited_slope(&freq, &y, MAX_SLOPE, 0, &features, &[false; 100]);
        assert!(unprotected.clipped[55]);
        assert!(unprotected.limited[55] < y[55]);
    }

    #[test]
    fn isolated_spike_without_feature_is_restored() {
        let freq = grid(100);
        let mut y = Array1::zeros(100);
        y[50] = 5.0;
        let mask = vec![false; 100];

        let out = limited_slope(&freq, &y, MAX_SLOPE, 0, &[], &mask);
        assert_eq!(out.limited, y);
        assert!(out.clipped.iter().all(|c| !c));
        assert!(out.regions.is_empty());

        let kept = limited_slope(&freq, &y, MAX_SLOPE, 0, &[50], &mask);
        let octave_step = (1.01f64).log2();
        assert!((kept.limited[50] - MAX_SLOPE * octave_step).abs() < 1e-9);
        assert_eq!(kept.regions, vec![50..51]);
    }

    #[test]
    fn featureless_tail_region_is_restored() {
        let freq = grid(20);
        let y = Array1::from_shape_fn(20, |i| if i >= 15 { 10.0 } else { 0.0 });
        let out = limited_slope(&freq, &y, MAX_SLOPE, 0, &[], &[false; 20]);
        assert_eq!(out.limited, y);
        assert!(out.clipped.iter().all(|c| !c));
        assert!(out.regions.is_empty());
    }

    #[test]
    fn tail_region_with_feature_is_kept() {
        let freq = grid(20);
        let y = Array1::from_shape_fn(20, |i| if i >= 15 { 10.0 } else { 0.0 });
        let out = limited_slope(&freq, &y, MAX_SLOPE, 0, &[16], &[false; 20]);
        assert_eq!(out.regions, vec![15..19]);
        assert!(out.clipped[15..20].iter().all(|&c| c));
        assert!(out.limited[19] < 10.0);
    }

    #[test]
    fn feature_on_last_sample_does_not_keep_tail_region() {
        let freq = grid(20);
        let y = Array1::from_shape_fn(20, |i| if i >= 15 { 10.0 } else { 0.0 });
        let out = limited_slope(&freq, &y, MAX_SLOPE, 0, &[19], &[false; 20]);
        assert_eq!(out.limited[19], 10.0);
        assert!(out.regions.is_empty());
    }

    #[test]
    fn rtl_limits_rising_slopes_towards_the_left() {
        let freq = grid(40);
        // a wall that rises when read right to left
        let y = Array1::from_shape_fn(40, |i| if i <= 10 { 8.0 } else { 0.0 });
        let out = limited_rtl_slope(&freq, &y, MAX_SLOPE, 39, &[10], &[false; 40]);
        assert!(out.clipped[10]);
        assert!(out.limited[10] < 8.0);
        assert_eq!(out.limited[39], 0.0);
        assert!(out.regions.iter().any(|r| r.contains(&10)));
    }

    #[test]
    fn rtl_start_follows_last_feature() {
        let (y, peaks, dips) = three_dips();
        assert_eq!(rtl_start(&y, &peaks, &dips), 80);

        // ends on a peak: first sample after it back down to the last dip level
        let y2 = piecewise(60, &[(0, 0.0), (20, -4.0), (40, 6.0), (59, -6.0)]);
        let start = rtl_start(&y2, &[40], &[20]);
        assert!(y2[start] <= -4.0 && y2[start - 1] > -4.0);
    }

    #[test]
    fn rtl_start_without_dips_uses_higher_end_point() {
        // y[0] = 1 is above y[last] = -3, so the pass starts where the
        // descent after the peak reaches 1 dB
        let y = piecewise(60, &[(0, 1.0), (30, 6.0), (59, -3.0)]);
        let start = rtl_start(&y, &[30], &[]);
        assert_eq!(start, 47);
        assert!(y[start] <= 1.0 && y[start - 1] > 1.0);

        let y = piecewise(60, &[(0, -2.0), (30, 6.0), (59, -1.0)]);
        assert_eq!(rtl_start(&y, &[30], &[]), 59);
    }

    #[test]
    fn zero_error_gives_zero_correction() {
        let f = generate_frequencies(20.0, 20000.0, 1.01);
        let c = Curve::zeros(&f);
        let eq = Equalizer::new().equalize(&c);
        assert!(eq.spl.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn flat_error_is_negated() {
        let f = generate_frequencies(20.0, 20000.0, 1.01);
        let c = Curve::new(f.clone(), Array1::from_elem(f.len(), 3.0));
        let eq = Equalizer::new().equalize(&c);
        assert!(eq.spl.iter().all(|v| (v + 3.0).abs() < 0.1));
    }
}
