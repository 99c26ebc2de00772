//! Contract-from-source - Command-line tool for inferring the HTTP contract
//! of a Go Echo service from its source code.
//!
//! # Usage
//!
//! ```bash
//! contract-from-source [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! # Examples
//!
//! Dump the discovered handler index:
//! ```bash
//! contract-from-source ./my-service -s internal/api/... -o contract.yaml
//! ```
//!
//! Match routes captured from the live router:
//! ```bash
//! contract-from-source ./my-service --routes routes.json -f json
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! contract-from-source ./my-service -v
//! ```

use anyhow::Result;
use clap::Parser;
use contract_from_source::cli;
use log::info;

fn main() -> Result<()> {
    // We need to parse args twice: once to get verbose flag, then again after logger init
    // First, do a quick parse just to check for verbose flag
    let args_for_verbose = cli::CliArgs::parse();

    // Initialize logger based on verbose flag
    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("Contract-from-source starting...");

    // Now do the full parse with validation
    let args = cli::parse_args_from_parsed(args_for_verbose)?;

    // Run the main workflow
    cli::run(args)?;

    info!("Contract extraction completed successfully");

    Ok(())
}
