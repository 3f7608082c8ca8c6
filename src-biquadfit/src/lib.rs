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
//! Given a measured frequency response and a target, this crate computes a
//! small set of peaking / shelving filters that bend the measurement toward
//! the target:
//!
//! - `equalize`: turns the error curve into a bounded, slope-limited
//!   correction curve
//! - `init` + `optim`: seed the filters one by one, then refine them jointly
//!   with a bounded L-BFGS solver
//! - `workflow`: the end-to-end pipeline used by the `biquadfit` binary

pub use biquadfit_iir as iir;

use ndarray::Array1;

/// Common CLI argument definitions
pub mod cli;
/// Filter constraints, parameters and presets
pub mod constraints;
/// Correction curve synthesis
pub mod equalize;
/// Error type shared by the boundary layers
pub mod error;
/// Sequential filter seeding
pub mod init;
/// Loss function for the joint optimizer
pub mod loss;
/// Bounded L-BFGS joint optimizer
pub mod optim;
/// Peak / dip detection
pub mod peaks;
/// Curve loading, validation and resampling
pub mod read;
/// Fractional-octave smoothing
pub mod smooth;
/// End-to-end fitting pipeline
pub mod workflow;
/// Parameter vector encoding
pub mod x2peq;

pub use constraints::{FilterParams, FilterSpec};
pub use error::{FitError, Result};
pub use iir::FilterKind;
pub use workflow::{FitOptions, FitResult, fit};

/// A frequency response: levels in dB on an ascending frequency grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    /// Frequencies in Hz, strictly increasing
    pub freq: Array1<f64>,
    /// Level in dB at each frequency
    pub spl: Array1<f64>,
}

impl Curve {
    /// Build a curve from its two columns.
    pub fn new(freq: Array1<f64>, spl: Array1<f64>) -> Self {
        debug_assert_eq!(freq.len(), spl.len());
        Self { freq, spl }
    }

    /// A 0 dB curve on `freq`.
    pub fn zeros(freq: &Array1<f64>) -> Self {
        Self {
            freq: freq.clone(),
            spl: Array1::zeros(freq.len()),
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.freq.len()
    }

    /// True when the curve has no points.
    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// Same grid, new levels.
    pub fn with_spl(&self, spl: Array1<f64>) -> Self {
        Self::new(self.freq.clone(), spl)
    }
}
