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

mod interpolate;
mod normalize;
mod read_csv;
mod read_json;
mod validate;

// Re-export commonly used functions
pub use interpolate::*;
pub use normalize::*;
pub use read_csv::{load_frequency_response, read_curve_from_csv, write_curves_to_csv};
pub use read_json::{FrPoint, curve_from_points, curve_to_points, read_curve_from_json};
pub use validate::validate_curve;

use crate::Curve;
use crate::error::Result;
use std::path::Path;

/// Load a curve from disk, choosing the format from the file extension.
///
/// `.json` files hold `[{"freq": .., "db": ..}, ..]`; anything else is read
/// as CSV / whitespace separated columns. The curve is validated before it
/// is returned.
pub fn load_curve(path: &Path) -> Result<Curve> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let curve = if is_json {
        read_curve_from_json(path)?
    } else {
        read_curve_from_csv(path)?
    };
    validate_curve(&curve)?;
    Ok(curve)
}
