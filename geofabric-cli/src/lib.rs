//! Command-line interface for the geofabric OSM ingestion pipeline.
//!
//! Parses `import`/`append` arguments, layers configuration (file → env →
//! CLI) through [`ortho_config`], and drives the chosen middle and
//! dependency manager through [`geofabric_engine::Osmdata`]. Logging setup
//! and the final error report live in `main`, not here, so this crate stays
//! testable without a process boundary.
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod null_output;
pub mod pipeline;

use clap::Parser;
use config::{Cli, Command};
pub use error::CliError;
pub use pipeline::IngestSummary;

/// Parses process arguments and runs the requested subcommand.
pub fn run() -> Result<IngestSummary, CliError> {
    let cli = Cli::try_parse_from(std::env::args_os()).map_err(CliError::ArgumentParsing)?;
    run_command(cli.command)
}

fn run_command(command: Command) -> Result<IngestSummary, CliError> {
    let (args, append) = match command {
        Command::Import(args) => (args, false),
        Command::Append(args) => (args, true),
    };
    let config = args.into_config(append)?;
    pipeline::execute(&config)
}

#[cfg(test)]
mod tests;
