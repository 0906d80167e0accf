//! Command-line interface for converting OpenStreetMap extracts.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod convert;
mod error;

use convert::{ConvertArgs, run_convert};
pub use error::CliError;

const ARG_INPUT: &str = "input";
const ARG_OUTPUT: &str = "output";
const ARG_WORKING_DIR: &str = "working-dir";
const ARG_WINDOW_SIZE: &str = "window-size";
const ARG_WAY_STORE: &str = "way-store";
const ARG_KEEP_STAGING: &str = "keep-staging";
const ENV_INPUT: &str = "WAYSTAGE_CMDS_CONVERT_INPUT";
const ENV_OUTPUT: &str = "WAYSTAGE_CMDS_CONVERT_OUTPUT";

/// Run the waystage CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Convert(args) => {
            run_convert(args)?;
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "waystage",
    about = "Convert OpenStreetMap extracts into SQLite geometry tables",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse, resolve and assemble an extract into a geometry database.
    Convert(ConvertArgs),
}

#[cfg(test)]
mod tests;
