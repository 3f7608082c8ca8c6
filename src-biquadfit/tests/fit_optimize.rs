mod common;

use biquadfit::constraints::{FilterParams, FilterSpec};
use biquadfit::iir::FilterKind;
use biquadfit::init::init_filters;
use biquadfit::optim::{MAX_ITER, optimize};
use common::*;
use ndarray::Array1;

#[test]
fn same_inputs_same_filters() {
    let f = opt_grid();
    let target = filtered(&f, &[(FilterKind::Peak, 2000.0, -4.0, 1.5), (FilterKind::LowShelf, 80.0, 3.0, 0.7)]);
    let specs = vec![FilterSpec::new(FilterKind::LowShelf), FilterSpec::new(FilterKind::Peak)];
    let seeds = init_filters(&f, &target.spl, &specs, SRATE);
    let a = optimize(&seeds, &specs, &f, &target.spl, SRATE);
    let b = optimize(&seeds, &specs, &f, &target.spl, SRATE);
    assert_eq!(a.filters, b.filters);
    assert_eq!(a.loss_history, b.loss_history);
}

#[test]
fn every_filter_respects_its_bounds() {
    let f = opt_grid();
    let target = filtered(&f, &[(FilterKind::Peak, 150.0, 12.0, 3.0), (FilterKind::HighShelf, 9000.0, -10.0, 0.7)]);
    let specs = vec![
        FilterSpec::new(FilterKind::Peak).with_gain(-6.0, 6.0).with_q(1.0, 5.0),
        FilterSpec::new(FilterKind::Peak).with_gain(0.0, 0.0),
        FilterSpec::new(FilterKind::HighShelf).with_fc(1000.0, 5000.0).with_gain(-3.0, 3.0),
        FilterSpec::new(FilterKind::LowShelf).with_q(0.7, 0.7),
    ];
    let seeds = init_filters(&f, &target.spl, &specs, SRATE);
    let res = optimize(&seeds, &specs, &f, &target.spl, SRATE);
    for (spec, p) in specs.iter().zip(res.filters.iter()) {
        assert!(spec.contains(p), "{:?} not in {:?}", p, spec);
    }
    assert_eq!(res.filters[1].gain, 0.0);
    assert_eq!(res.filters[3].q, 0.7);
}

#[test]
fn zero_target_drives_gains_to_zero() {
    let f = opt_grid();
    let specs = vec![FilterSpec::new(FilterKind::Peak); 3];
    let initial = vec![
        FilterParams::new(FilterKind::Peak, 100.0, 6.0, 1.0),
        FilterParams::new(FilterKind::Peak, 1000.0, -6.0, 2.0),
        FilterParams::new(FilterKind::Peak, 5000.0, 4.0, 0.7),
    ];
    let res = optimize(&initial, &specs, &f, &Array1::zeros(f.len()), SRATE);
    assert!(res.iterations <= MAX_ITER);
    assert!(res.loss < 0.5, "loss {}", res.loss);
}

#[test]
fn recovers_a_single_peak() {
    let f = opt_grid();
    let target = filtered(&f, &[(FilterKind::Peak, 1000.0, 6.0, 2.0)]);
    let specs = vec![FilterSpec::new(FilterKind::Peak)];
    let seeds = init_filters(&f, &target.spl, &specs, SRATE);
    let res = optimize(&seeds, &specs, &f, &target.spl, SRATE);
    let p = res.filters[0];
    assert!(res.loss < 0.5, "loss {}", res.loss);
    assert!((p.fc / 1000.0).log2().abs() < 0.15, "fc {}", p.fc);
    assert!((p.gain - 6.0).abs() < 1.5, "gain {}", p.gain);
}

#[test]
fn returns_best_point_seen() {
    let f = opt_grid();
    let target = iem_like(&f).spl.mapv(|v| -v);
    let specs = vec![FilterSpec::new(FilterKind::Peak); 2];
    let seeds = init_filters(&f, &target, &specs, SRATE);
    let res = optimize(&seeds, &specs, &f, &target, SRATE);
    let best = res.loss_history.iter().cloned().fold(f64::INFINITY, f64::min);
    assert_eq!(res.loss, best);
}
