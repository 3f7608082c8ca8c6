use crate::Curve;
use ndarray::Array1;

/// Lowest frequency of the standard grid (Hz)
pub const DEFAULT_F_MIN: f64 = 20.0;
/// Highest frequency of the standard grid (Hz)
pub const DEFAULT_F_MAX: f64 = 20000.0;
/// Grid ratio used while synthesizing the correction curve
pub const DEFAULT_STEP: f64 = 1.01;
/// Coarser grid ratio used by the filter optimizer
pub const DEFAULT_BIQUAD_OPTIMIZATION_F_STEP: f64 = 1.02;

/// Create a multiplicative frequency grid.
///
/// The grid is anchored at `min(20 kHz, f_max)` and walks down by `f_step`
/// while staying strictly above `f_min`, then up while staying strictly
/// below `f_max`. Every point is `anchor * f_step^k`, so consecutive ratios
/// are exactly `f_step` up to rounding.
pub fn generate_frequencies(f_min: f64, f_max: f64, f_step: f64) -> Array1<f64> {
    debug_assert!(f_step > 1.0);
    let anchor = DEFAULT_F_MAX.min(f_max);
    let mut below = Vec::new();
    let mut k = 0;
    loop {
        let f = anchor / f_step.powi(k);
        if f <= f_min {
            break;
        }
        below.push(f);
        k += 1;
    }
    below.reverse();

    let mut k = 1;
    loop {
        let f = anchor * f_step.powi(k);
        if f >= f_max {
            break;
        }
        below.push(f);
        k += 1;
    }
    Array1::from_vec(below)
}

/// Interpolate `curve` onto `freq_out` linearly in log-frequency.
///
/// Points outside the input range take the nearest end value.
pub fn interpolate_log_space(curve: &Curve, freq_out: &Array1<f64>) -> Array1<f64> {
    let n_in = curve.freq.len();
    if n_in == 0 {
        return Array1::zeros(freq_out.len());
    }
    let log_in: Vec<f64> = curve.freq.iter().map(|f| f.log10()).collect();
    let spl_in = &curve.spl;

    freq_out.mapv(|f| {
        let lf = f.log10();
        if lf <= log_in[0] {
            return spl_in[0];
        }
        if lf >= log_in[n_in - 1] {
            return spl_in[n_in - 1];
        }
        // first index with log_in[j] >= lf, so j >= 1 here
        let j = log_in.partition_point(|&x| x < lf);
        let t = (lf - log_in[j - 1]) / (log_in[j] - log_in[j - 1]);
        spl_in[j - 1] * (1.0 - t) + spl_in[j] * t
    })
}

/// Level of `curve` at a single frequency (log-linear, clamped).
pub fn level_at(curve: &Curve, freq: f64) -> f64 {
    interpolate_log_space(curve, &Array1::from_vec(vec![freq]))[0]
}

/// Resample a curve onto a fresh multiplicative grid.
pub fn resample(curve: &Curve, f_step: f64, f_min: f64, f_max: f64) -> Curve {
    let freq = generate_frequencies(f_min, f_max, f_step);
    let spl = interpolate_log_space(curve, &freq);
    Curve::new(freq, spl)
}

/// Average ratio between consecutive frequencies of a grid.
pub fn average_step(freq: &Array1<f64>) -> f64 {
    let n = freq.len();
    if n < 2 {
        return 1.0;
    }
    // geometric mean of the ratios
    ((freq[n - 1] / freq[0]).ln() / (n - 1) as f64).exp()
}

/// Index of the grid point closest to `f`.
pub fn nearest_index(freq: &Array1<f64>, f: f64) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, &x) in freq.iter().enumerate() {
        let d = (x - f).abs();
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn grid_has_constant_ratio() {
        let f = generate_frequencies(DEFAULT_F_MIN, DEFAULT_F_MAX, DEFAULT_STEP);
        assert!(f[0] > DEFAULT_F_MIN);
        assert!((f[f.len() - 1] - DEFAULT_F_MAX).abs() < 1e-9);
        for w in f.as_slice().unwrap().windows(2) {
            assert!((w[1] / w[0] - DEFAULT_STEP).abs() < 1e-9);
        }
        // log(1000) / log(1.01)
        assert!(f.len() > 690 && f.len() < 696, "len {}", f.len());
    }

    #[test]
    fn grid_extends_above_anchor() {
        let f = generate_frequencies(1000.0, 24000.0, 1.1);
        assert!(f.iter().any(|&x| x > 20000.0));
        assert!(f.iter().all(|&x| x < 24000.0 && x > 1000.0));
    }

    #[test]
    fn interpolation_is_log_linear_and_clamped() {
        let c = Curve::new(array![100.0, 1000.0], array![0.0, 10.0]);
        let out = interpolate_log_space(&c, &array![10.0, 100.0, 316.227766, 1000.0, 5000.0]);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 5.0).abs() < 1e-6);
        assert_eq!(out[3], 10.0);
        assert_eq!(out[4], 10.0);
    }

    #[test]
    fn average_step_matches_grid() {
        let f = generate_frequencies(20.0, 20000.0, 1.02);
        assert!((average_step(&f) - 1.02).abs() < 1e-9);
    }

    #[test]
    fn nearest_index_finds_closest() {
        let f = array![10.0, 100.0, 1000.0];
        assert_eq!(nearest_index(&f, 400.0), 1);
        assert_eq!(nearest_index(&f, 700.0), 2);
    }
}
