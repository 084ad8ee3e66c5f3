//! Fit MQ135 calibration constants to digitised datasheet points.
//!
//! Usage: `mq135-fit <config.toml>`
use std::path::PathBuf;
use std::process::ExitCode;

use log::error;

use mq135::calibration::{build, FitConfig};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: mq135-fit <config.toml>");
        return ExitCode::FAILURE;
    };

    match FitConfig::from_file(&path).and_then(|config| build(&config)) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("calibration from {path:?} failed: {err}");
            ExitCode::FAILURE
        }
    }
}
