use std::path::Path;

use crate::Curve;
use crate::error::Result;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// One `{freq, db}` sample of a JSON frequency response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrPoint {
    /// Frequency in Hz
    pub freq: f64,
    /// Level in dB
    pub db: f64,
}

/// Build a curve from JSON points (order is preserved; validate afterwards).
pub fn curve_from_points(points: &[FrPoint]) -> Curve {
    Curve::new(
        points.iter().map(|p| p.freq).collect::<Array1<f64>>(),
        points.iter().map(|p| p.db).collect::<Array1<f64>>(),
    )
}

/// Convert a curve back to JSON points.
pub fn curve_to_points(curve: &Curve) -> Vec<FrPoint> {
    curve
        .freq
        .iter()
        .zip(curve.spl.iter())
        .map(|(&freq, &db)| FrPoint { freq, db })
        .collect()
}

/// Read a `[{"freq": .., "db": ..}, ..]` file.
pub fn read_curve_from_json(path: &Path) -> Result<Curve> {
    let text = std::fs::read_to_string(path)?;
    let points: Vec<FrPoint> = serde_json::from_str(&text)?;
    Ok(curve_from_points(&points))
}
