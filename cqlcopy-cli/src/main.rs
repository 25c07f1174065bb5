//! cqlcopy - bulk-load delimited files into CQL tables.
//!
//! Rows are written through a bounded window of concurrent writes. Progress
//! goes to stdout; logs go to stderr and, with `--log-file`, to a file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cqlcopy::logging::init_logging;

use crate::commands::config::ConfigArgs;
use crate::commands::copy::CopyArgs;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "cqlcopy", version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/cqlcopy/cqlcopyrc)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a delimited file into a table
    Copy(CopyArgs),

    /// Show effective load options
    Config(ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _logging = init_logging(cli.log_file.as_deref())?;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Copy(args) => commands::copy::run(args, config),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
