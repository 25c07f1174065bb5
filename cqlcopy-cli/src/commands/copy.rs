//! `cqlcopy copy`: load a delimited file into a table.
//!
//! Rows are turned into `INSERT` statements and written through the chained
//! writer into a CQL script, which can be replayed with a CQL shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use cqlcopy::config::{parse_char, CopyOptions};
use cqlcopy::copy::{CsvSource, InsertBuilder, ScriptSession};
use cqlcopy::pipeline::{ChainedWriter, InterruptHandle, RateMeter};
use tracing::{info, warn};

use crate::error::CliError;

/// Arguments of `cqlcopy copy`.
#[derive(Debug, Args)]
pub struct CopyArgs {
    /// Target table, optionally keyspace-qualified (e.g. ks.users)
    #[arg(long)]
    pub table: String,

    /// Target columns in file order, comma-separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub columns: Vec<String>,

    /// Delimited input file
    #[arg(long)]
    pub from: PathBuf,

    /// Output CQL script (default: <table>.cql)
    #[arg(long)]
    pub to: Option<PathBuf>,

    /// Number of concurrently outstanding writes
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Field delimiter (a single character, or \t)
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Quote character
    #[arg(long)]
    pub quote: Option<String>,

    /// Treat the first row as a header
    #[arg(long)]
    pub header: bool,

    /// Field value that loads as null
    #[arg(long)]
    pub null: Option<String>,

    /// Maximum number of rows to load (-1 for no limit)
    #[arg(long, allow_negative_numbers = true)]
    pub max_rows: Option<i64>,

    /// Number of leading rows to skip
    #[arg(long)]
    pub skip_rows: Option<u64>,
}

/// Outcome of a successful load.
#[derive(Debug)]
pub struct LoadSummary {
    pub rows: u64,
    pub elapsed: Duration,
    pub script: PathBuf,
}

/// Run the copy command.
pub fn run(args: CopyArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let options = resolve_options(&args, config_path)?;
    let meter = Arc::new(RateMeter::new());

    let summary = load(&args, &options, meter, |handle| {
        ctrlc::set_handler(move || handle.interrupt())
            .map_err(|e| CliError::Signal(e.to_string()))
    })?;

    info!(script = %summary.script.display(), "Script written");
    println!(
        "{} rows imported in {:.3} seconds.",
        summary.rows,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

/// Merge file options for the table with command-line flags.
///
/// Flags take precedence over the config file.
pub fn resolve_options(
    args: &CopyArgs,
    config_path: Option<&Path>,
) -> Result<CopyOptions, CliError> {
    let mut options = CopyOptions::load(config_path, Some(&args.table))?;

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(CliError::InvalidArgument(
                "--concurrency must be at least 1".to_string(),
            ));
        }
        options = options.with_concurrency(concurrency);
    }
    if let Some(delimiter) = &args.delimiter {
        options = options.with_delimiter(single_char("--delimiter", delimiter)?);
    }
    if let Some(quote) = &args.quote {
        options = options.with_quote(single_char("--quote", quote)?);
    }
    if args.header {
        options = options.with_header(true);
    }
    if let Some(null) = &args.null {
        options = options.with_null_marker(null.clone());
    }
    if let Some(max_rows) = args.max_rows {
        options = options.with_max_rows(match max_rows {
            -1 => None,
            n if n < 0 => {
                return Err(CliError::InvalidArgument(
                    "--max-rows must be -1 or non-negative".to_string(),
                ))
            }
            n => Some(n as u64),
        });
    }
    if let Some(skip_rows) = args.skip_rows {
        options = options.with_skip_rows(skip_rows);
    }

    Ok(options)
}

/// Default script path for a table.
pub fn default_script_path(table: &str) -> PathBuf {
    PathBuf::from(format!("{}.cql", table))
}

/// Trim column names and reject empty ones.
pub fn parse_columns(columns: &[String]) -> Result<Vec<String>, CliError> {
    let columns: Vec<String> = columns.iter().map(|c| c.trim().to_string()).collect();
    if columns.is_empty() || columns.iter().any(String::is_empty) {
        return Err(CliError::InvalidArgument(format!(
            "invalid column list '{}'",
            columns.join(",")
        )));
    }
    Ok(columns)
}

fn single_char(flag: &str, value: &str) -> Result<u8, CliError> {
    parse_char(value).ok_or_else(|| {
        CliError::InvalidArgument(format!("{} expects a single ASCII character", flag))
    })
}

/// Load the input file into a script.
///
/// `on_start` receives the writer's interrupt handle before loading begins.
pub fn load<F>(
    args: &CopyArgs,
    options: &CopyOptions,
    meter: Arc<RateMeter>,
    on_start: F,
) -> Result<LoadSummary, CliError>
where
    F: FnOnce(InterruptHandle) -> Result<(), CliError>,
{
    let columns = parse_columns(&args.columns)?;
    let script = args
        .to
        .clone()
        .unwrap_or_else(|| default_script_path(&args.table));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("cqlcopy-worker")
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let source = Arc::new(CsvSource::from_path(&args.from, options)?);
    let session = Arc::new(runtime.block_on(ScriptSession::create(&script))?);
    let builder = InsertBuilder::new(args.table.as_str(), columns)
        .with_null_marker(options.null_marker.as_str());

    info!(
        table = %args.table,
        input = %args.from.display(),
        script = %script.display(),
        concurrency = options.concurrency,
        "Starting copy"
    );

    let writer = ChainedWriter::new(
        runtime.handle().clone(),
        options.writer_config(),
        Arc::clone(&session),
        source,
        builder,
        meter,
    );
    on_start(writer.interrupt_handle())?;

    let started = Instant::now();
    let result = writer.insert();
    let elapsed = started.elapsed();
    let flushed = runtime.block_on(session.flush());

    if let Some(error) = result.error {
        if let Err(e) = flushed {
            warn!(error = %e, "Failed to flush script after load error");
        }
        return Err(CliError::Load {
            completed: result.completed,
            error,
        });
    }
    flushed?;

    info!(
        rows = result.completed,
        elapsed_ms = elapsed.as_millis() as u64,
        "Copy finished"
    );
    Ok(LoadSummary {
        rows: result.completed,
        elapsed,
        script,
    })
}
