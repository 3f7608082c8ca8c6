mod common;

use biquadfit::constraints::preset;
use biquadfit::iir::PREAMP_HEADROOM;
use biquadfit::read::{curve_to_points, load_curve};
use biquadfit::workflow::{FitOptions, FitRequest, fit};
use common::*;
use std::io::Write;

fn rms(v: &ndarray::Array1<f64>) -> f64 {
    (v.mapv(|x| x * x).sum() / v.len() as f64).sqrt()
}

#[test]
fn standard_preset_improves_an_iem() {
    let measurement = sparse(&iem_like(&eq_grid()), 1.05);
    let specs = preset("standard").unwrap().resolve().unwrap();
    let res = fit(&measurement, None, &specs, &FitOptions::default()).unwrap();

    let before = rms(&res.curves.error.spl);
    assert!(res.rmse < before, "rmse {} not below {}", res.rmse, before);
    for (spec, p) in specs.iter().zip(res.filters.iter()) {
        assert!(spec.contains(p));
    }
    let max = res.curves.parametric_eq.spl.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert!((res.pregain - (-max - PREAMP_HEADROOM)).abs() < 1e-12);
}

#[test]
fn target_is_followed() {
    let f = eq_grid();
    let measurement = flat(&f, 0.0);
    let target = filtered(&f, &[(biquadfit::FilterKind::Peak, 2000.0, 4.0, 1.0)]);
    let specs = preset("restricted").unwrap().resolve().unwrap();
    let res = fit(&measurement, Some(&target), &specs, &FitOptions::default()).unwrap();
    assert!(res.rmse < rms(&res.curves.error.spl));
    assert!(res.filters.iter().any(|p| p.gain > 1.0));
}

#[test]
fn report_is_rounded() {
    let specs = preset("restricted").unwrap().resolve().unwrap();
    let res = fit(&iem_like(&eq_grid()), None, &specs, &FitOptions::default()).unwrap();
    let report = res.report();
    for (r, p) in report.filters.iter().zip(res.filters.iter()) {
        assert_eq!(r.kind, "PK");
        assert!((r.freq - p.fc).abs() <= 0.005 + 1e-9);
        assert!((r.gain - p.gain).abs() <= 0.00005 + 1e-12);
        assert!((r.q - p.q).abs() <= 0.00005 + 1e-12);
    }
    let apo = res.to_apo("# test");
    assert!(apo.starts_with("# test\nPreamp:"));
    assert_eq!(apo.matches("Filter ").count(), 3);
}

#[test]
fn files_and_requests_agree() {
    let measurement = sparse(&iem_like(&eq_grid()), 1.1);
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("fr.csv");
    let mut csv = std::fs::File::create(&csv_path).unwrap();
    writeln!(csv, "frequency,raw").unwrap();
    for (f, v) in measurement.freq.iter().zip(measurement.spl.iter()) {
        writeln!(csv, "{},{}", f, v).unwrap();
    }
    drop(csv);
    let loaded = load_curve(&csv_path).unwrap();
    let specs = preset("restricted").unwrap().resolve().unwrap();
    let from_file = fit(&loaded, None, &specs, &FitOptions::default()).unwrap();

    let request = serde_json::json!({
        "fr": curve_to_points(&loaded),
        "config": preset("restricted").unwrap(),
    });
    let req_path = dir.path().join("request.json");
    std::fs::write(&req_path, request.to_string()).unwrap();
    let from_request = FitRequest::from_path(&req_path)
        .unwrap()
        .run(&FitOptions::default())
        .unwrap();

    assert_eq!(from_file.report(), from_request.report());
}

#[test]
fn sample_rate_changes_coefficients_not_shape() {
    let specs = preset("restricted").unwrap().resolve().unwrap();
    let m = iem_like(&eq_grid());
    let options = FitOptions {
        sample_rate: 96000.0,
        ..FitOptions::default()
    };
    let res = fit(&m, None, &specs, &options).unwrap();
    assert_eq!(res.sample_rate, 96000.0);
    assert!(res.peq().iter().all(|b| b.srate == 96000.0));
}
