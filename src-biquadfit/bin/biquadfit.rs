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

use biquadfit::cli::{self, Args};
use biquadfit::read;
use biquadfit::workflow::{self, FitRequest, FitResult};
use clap::Parser;
use std::process;

fn run(args: &Args) -> biquadfit::Result<FitResult> {
    let options = args.fit_options();
    if let Some(path) = &args.request {
        log::info!("reading request from {}", path.display());
        return FitRequest::from_path(path)?.run(&options);
    }

    // validate_args guarantees one of --curve / --request
    let Some(curve_path) = &args.curve else {
        return Err(biquadfit::FitError::InvalidInput {
            message: "no measurement given".to_string(),
        });
    };
    let measurement = read::load_curve(curve_path)?;
    let target = match &args.target {
        Some(path) => Some(read::load_curve(path)?),
        None => None,
    };
    let specs = args.specs()?;
    log::info!(
        "loaded {} points from {}, fitting {} filters",
        measurement.len(),
        curve_path.display(),
        specs.len()
    );
    workflow::fit(&measurement, target.as_ref(), &specs, &options)
}

fn write_outputs(args: &Args, result: &FitResult) -> biquadfit::Result<()> {
    if let Some(path) = &args.output {
        std::fs::write(path, result.to_apo(""))?;
        log::info!("wrote {}", path.display());
    }
    if let Some(path) = &args.curves {
        result.write_curves(path)?;
        log::info!("wrote {}", path.display());
    }
    if args.json {
        println!("{}", serde_json::to_string(&result.report())?);
    } else if args.output.is_none() {
        print!("{}", result.to_apo(""));
    }
    Ok(())
}

/// Fit peaking and shelving filters so a measurement follows a target curve.
fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    cli::validate_args_or_exit(&args);

    let outcome = run(&args).and_then(|result| write_outputs(&args, &result));
    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
