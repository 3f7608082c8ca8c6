use crate::Curve;

use super::interpolate::level_at;

/// Frequency at which responses are anchored to 0 dB
pub const CENTER_FREQ: f64 = 1000.0;

/// Shift a curve so its level at `freq` is 0 dB.
pub fn center(curve: &Curve, freq: f64) -> Curve {
    let offset = level_at(curve, freq);
    curve.with_spl(&curve.spl - offset)
}

/// Point-wise `a - b` of two curves on the same grid.
pub fn subtract(a: &Curve, b: &Curve) -> Curve {
    debug_assert_eq!(a.freq.len(), b.freq.len());
    a.with_spl(&a.spl - &b.spl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn center_zeroes_level_at_1k() {
        let c = Curve::new(array![100.0, 1000.0, 10000.0], array![3.0, 5.0, 1.0]);
        let centered = center(&c, CENTER_FREQ);
        assert_eq!(centered.spl, array![-2.0, 0.0, -4.0]);
        assert_eq!(centered.freq, c.freq);
    }

    #[test]
    fn subtract_is_pointwise() {
        let a = Curve::new(array![1.0, 2.0], array![3.0, 4.0]);
        let b = Curve::new(array![1.0, 2.0], array![1.0, 6.0]);
        assert_eq!(subtract(&a, &b).spl, array![2.0, -2.0]);
    }
}
