//! biquadfit - Parametric equalizer fitting
//! Command-line interface definitions
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

use crate::constraints::{FilterSpec, PRESET_NAMES, PeqConfig, preset};
use crate::error::Result;
use crate::workflow::{DEFAULT_SAMPLE_RATE, FitOptions};
use clap::Parser;
use std::path::PathBuf;
use std::process;

/// Preset used when neither --config nor --preset is given
pub const DEFAULT_PRESET: &str = "standard";

/// CLI arguments of the `biquadfit` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Measured frequency response (CSV / text columns, or JSON [{freq, db}]).
    #[arg(short, long)]
    pub curve: Option<PathBuf>,

    /// Target curve in the same formats. A flat 0 dB target is assumed if absent.
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// JSON constraint config: {"filters": [{"type", "min_gain", ...}]}.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Built-in constraint preset (standard, restricted, qudelix_10).
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Read a {fr, target, config} JSON request from a file, or "-" for stdin.
    #[arg(long)]
    pub request: Option<PathBuf>,

    /// The sample rate for the IIR filters.
    #[arg(short, long, default_value_t = DEFAULT_SAMPLE_RATE, value_parser = parse_strictly_positive_f64)]
    pub sample_rate: f64,

    /// Write an EqualizerAPO ParametricEQ.txt file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the intermediate curves (raw, target, error, equalization, parametric_eq) as CSV.
    #[arg(long)]
    pub curves: Option<PathBuf>,

    /// Print the {filters, pregain, rmse} JSON result on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Log pipeline details (same as RUST_LOG=debug).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Args {
    /// Filter constraints selected by --config / --preset.
    pub fn specs(&self) -> Result<Vec<FilterSpec>> {
        let config = match (&self.config, &self.preset) {
            (Some(path), _) => PeqConfig::from_file(path)?,
            (None, Some(name)) => preset(name)?,
            (None, None) => preset(DEFAULT_PRESET)?,
        };
        config.resolve()
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            sample_rate: self.sample_rate,
            ..FitOptions::default()
        }
    }
}

/// Validate CLI arguments
///
/// # Returns
/// * `Ok(())` if all arguments are consistent
/// * `Err(String)` describing the first problem found
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    match (&args.curve, &args.request) {
        (None, None) => return Err("Either --curve or --request must be provided".to_string()),
        (Some(_), Some(_)) => {
            return Err("--curve and --request cannot be used together".to_string());
        }
        _ => {}
    }
    if args.request.is_some() && (args.target.is_some() || args.config.is_some() || args.preset.is_some()) {
        return Err(
            "--request carries its own target and config; drop --target, --config and --preset"
                .to_string(),
        );
    }
    if args.config.is_some() && args.preset.is_some() {
        return Err("--config and --preset cannot be used together".to_string());
    }
    if let Some(name) = args.preset.as_deref().filter(|n| !PRESET_NAMES.contains(n)) {
        return Err(format!(
            "Unknown preset '{}'. Expected one of: {}",
            name,
            PRESET_NAMES.join(", ")
        ));
    }
    if args.sample_rate < 8000.0 {
        return Err(format!(
            "Sample rate {} Hz is too low. Must be >= 8000 Hz",
            args.sample_rate
        ));
    }
    Ok(())
}

/// Validate arguments and exit with error if validation fails
pub fn validate_args_or_exit(args: &Args) {
    if let Err(error) = validate_args(args) {
        eprintln!("Validation Error: {}", error);
        process::exit(1);
    }
}

// Custom value parser to enforce strictly positive f64
fn parse_strictly_positive_f64(s: &str) -> std::result::Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("invalid float: {s}"))?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err("value must be strictly positive (> 0)".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iir::FilterKind;

    #[test]
    fn parse_defaults() {
        let args = Args::parse_from(["biquadfit-test", "--curve", "fr.csv"]);
        assert_eq!(args.sample_rate, 44100.0);
        assert!(!args.json);
        assert!(validate_args(&args).is_ok());
        let specs = args.specs().unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].kind, FilterKind::LowShelf);
    }

    #[test]
    fn sample_rate_must_be_positive() {
        let res = Args::try_parse_from(["biquadfit-test", "--sample-rate", "0"]);
        assert!(res.is_err());
        let res = Args::try_parse_from(["biquadfit-test", "--sample-rate", "-48000"]);
        assert!(res.is_err());
    }

    #[test]
    fn validate_args_needs_an_input() {
        let args = Args::parse_from(["biquadfit-test"]);
        let result = validate_args(&args);
        assert!(result.unwrap_err().contains("--curve or --request"));
    }

    #[test]
    fn validate_args_exclusive_inputs() {
        let args = Args::parse_from(["biquadfit-test", "-c", "a.csv", "--request", "-"]);
        assert!(validate_args(&args).unwrap_err().contains("cannot be used together"));

        let args = Args::parse_from(["biquadfit-test", "--request", "-", "--preset", "restricted"]);
        assert!(validate_args(&args).unwrap_err().contains("--request carries"));

        let args = Args::parse_from([
            "biquadfit-test",
            "-c",
            "a.csv",
            "--preset",
            "restricted",
            "--config",
            "c.json",
        ]);
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn validate_args_unknown_preset() {
        let args = Args::parse_from(["biquadfit-test", "-c", "a.csv", "--preset", "loud"]);
        assert!(validate_args(&args).unwrap_err().contains("Unknown preset"));
    }

    #[test]
    fn validate_args_low_sample_rate() {
        let args = Args::parse_from(["biquadfit-test", "-c", "a.csv", "-s", "4000"]);
        assert!(validate_args(&args).unwrap_err().contains("too low"));
    }

    #[test]
    fn preset_selection() {
        let args = Args::parse_from(["biquadfit-test", "-c", "a.csv", "-p", "qudelix_10", "-s", "48000"]);
        assert_eq!(args.specs().unwrap().len(), 10);
        assert_eq!(args.fit_options().sample_rate, 48000.0);
    }
}
