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
//! Filter constraints.
//!
//! A constraint config is a list of filter entries; every bound is optional
//! and falls back to a per-kind default. Resolving a config checks the
//! bounds once so the optimizer can trust them.

use std::path::Path;

use crate::error::{FitError, Result};
use crate::iir::{Biquad, FilterKind};
use serde::{Deserialize, Serialize};

/// Default fc range for every kind (Hz)
pub const DEFAULT_FC_BOUNDS: (f64, f64) = (20.0, 10000.0);
/// Default gain range for every kind (dB)
pub const DEFAULT_GAIN_BOUNDS: (f64, f64) = (-20.0, 20.0);
/// Default Q range of peaking filters
pub const DEFAULT_PEAK_Q_BOUNDS: (f64, f64) = (0.18248, 6.0);
/// Default Q range of shelving filters
pub const DEFAULT_SHELF_Q_BOUNDS: (f64, f64) = (0.4, 0.7);

/// Names of the built-in presets.
pub const PRESET_NAMES: [&str; 3] = ["standard", "restricted", "qudelix_10"];

/// Resolved bounds of one filter (closed intervals).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub gain_bounds: (f64, f64),
    pub q_bounds: (f64, f64),
    pub fc_bounds: (f64, f64),
}

impl FilterSpec {
    /// Spec with the default bounds of `kind`.
    pub fn new(kind: FilterKind) -> Self {
        let q_bounds = match kind {
            FilterKind::Peak => DEFAULT_PEAK_Q_BOUNDS,
            FilterKind::LowShelf | FilterKind::HighShelf => DEFAULT_SHELF_Q_BOUNDS,
        };
        Self {
            kind,
            gain_bounds: DEFAULT_GAIN_BOUNDS,
            q_bounds,
            fc_bounds: DEFAULT_FC_BOUNDS,
        }
    }

    pub fn with_gain(mut self, min: f64, max: f64) -> Self {
        self.gain_bounds = (min, max);
        self
    }

    pub fn with_q(mut self, min: f64, max: f64) -> Self {
        self.q_bounds = (min, max);
        self
    }

    pub fn with_fc(mut self, min: f64, max: f64) -> Self {
        self.fc_bounds = (min, max);
        self
    }

    /// Check that every interval is ordered and finite, and that fc and Q
    /// are strictly positive.
    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, (lo, hi): (f64, f64)| -> Result<()> {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(FitError::config(format!(
                    "{} {} bounds must be finite, got [{}, {}]",
                    self.kind, name, lo, hi
                )));
            }
            if lo > hi {
                return Err(FitError::config(format!(
                    "{} {} bounds are inverted: min {} > max {}",
                    self.kind, name, lo, hi
                )));
            }
            Ok(())
        };
        check("gain", self.gain_bounds)?;
        check("q", self.q_bounds)?;
        check("fc", self.fc_bounds)?;
        if self.q_bounds.0 <= 0.0 {
            return Err(FitError::config(format!(
                "{} min_q must be > 0, got {}",
                self.kind, self.q_bounds.0
            )));
        }
        if self.fc_bounds.0 <= 0.0 {
            return Err(FitError::config(format!(
                "{} min_fc must be > 0 Hz, got {}",
                self.kind, self.fc_bounds.0
            )));
        }
        Ok(())
    }

    /// Clamp a parameter set into these bounds.
    pub fn clamp(&self, params: FilterParams) -> FilterParams {
        FilterParams {
            kind: self.kind,
            fc: params.fc.clamp(self.fc_bounds.0, self.fc_bounds.1),
            gain: params.gain.clamp(self.gain_bounds.0, self.gain_bounds.1),
            q: params.q.clamp(self.q_bounds.0, self.q_bounds.1),
        }
    }

    /// True when `params` sits inside these bounds.
    pub fn contains(&self, params: &FilterParams) -> bool {
        let inside = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        params.kind == self.kind
            && inside(params.fc, self.fc_bounds)
            && inside(params.gain, self.gain_bounds)
            && inside(params.q, self.q_bounds)
    }
}

/// One filter of a solution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub fc: f64,
    pub gain: f64,
    pub q: f64,
}

impl FilterParams {
    pub fn new(kind: FilterKind, fc: f64, gain: f64, q: f64) -> Self {
        Self { kind, fc, gain, q }
    }

    /// The biquad realising this filter at `srate`.
    pub fn to_biquad(&self, srate: f64) -> Biquad {
        Biquad::new(self.kind, self.fc, srate, self.q, self.gain)
    }
}

/// One entry of a constraint config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_q: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_q: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fc: Option<f64>,
}

impl FilterConfig {
    fn kind_only(kind: FilterKind) -> Self {
        Self {
            kind: kind.long_name().to_string(),
            min_gain: None,
            max_gain: None,
            min_q: None,
            max_q: None,
            min_fc: None,
            max_fc: None,
        }
    }

    fn gain(mut self, limit: f64) -> Self {
        self.min_gain = Some(-limit);
        self.max_gain = Some(limit);
        self
    }

    fn q(mut self, min: f64, max: f64) -> Self {
        self.min_q = Some(min);
        self.max_q = Some(max);
        self
    }

    /// Fill the defaults of the entry's kind and validate.
    pub fn resolve(&self) -> Result<FilterSpec> {
        let kind: FilterKind = self.kind.parse()?;
        let d = FilterSpec::new(kind);
        let spec = FilterSpec {
            kind,
            gain_bounds: (
                self.min_gain.unwrap_or(d.gain_bounds.0),
                self.max_gain.unwrap_or(d.gain_bounds.1),
            ),
            q_bounds: (
                self.min_q.unwrap_or(d.q_bounds.0),
                self.max_q.unwrap_or(d.q_bounds.1),
            ),
            fc_bounds: (
                self.min_fc.unwrap_or(d.fc_bounds.0),
                self.max_fc.unwrap_or(d.fc_bounds.1),
            ),
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// A constraint config: `{"filters": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeqConfig {
    pub filters: Vec<FilterConfig>,
}

impl PeqConfig {
    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Resolve every entry; an empty filter list is an error.
    pub fn resolve(&self) -> Result<Vec<FilterSpec>> {
        if self.filters.is_empty() {
            return Err(FitError::config("config has no filters"));
        }
        self.filters
            .iter()
            .enumerate()
            .map(|(i, f)| {
                f.resolve().map_err(|e| match e {
                    FitError::InvalidConfig { message } => {
                        FitError::config(format!("filter {}: {}", i + 1, message))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

/// Built-in constraint config by name.
pub fn preset(name: &str) -> Result<PeqConfig> {
    let peak = || FilterConfig::kind_only(FilterKind::Peak);
    let low = || FilterConfig::kind_only(FilterKind::LowShelf);
    let high = || FilterConfig::kind_only(FilterKind::HighShelf);

    let filters = match name {
        "standard" => {
            let mut v = vec![low().gain(12.0)];
            v.extend((0..3).map(|_| peak().gain(12.0).q(0.5, 10.0)));
            v.push(high().gain(12.0));
            v
        }
        "restricted" => (0..3).map(|_| peak().gain(6.0).q(1.0, 5.0)).collect(),
        "qudelix_10" => {
            let mut v = vec![low().gain(12.0)];
            v.extend((0..8).map(|_| peak().gain(12.0).q(0.5, 10.0)));
            v.push(high().gain(12.0));
            v
        }
        other => return Err(FitError::UnknownPreset(other.to_string())),
    };
    Ok(PeqConfig { filters })
}
