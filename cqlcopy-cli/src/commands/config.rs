//! `cqlcopy config`: show effective load options.

use std::path::{Path, PathBuf};

use clap::Args;
use cqlcopy::config::{table_section, CopyOptions, COPY_SECTION};

use crate::error::CliError;

/// Arguments of `cqlcopy config`.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Show options as overridden for this table
    #[arg(long)]
    pub table: Option<String>,
}

/// Run the config command.
pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let options = CopyOptions::load(config_path, args.table.as_deref())?;
    match effective_path(config_path) {
        Some(path) if path.exists() => println!("# {}", path.display()),
        Some(path) => println!("# {} (not found, using defaults)", path.display()),
        None => println!("# no config directory, using defaults"),
    }
    print!("{}", render(&options, args.table.as_deref()));
    Ok(())
}

/// Render options as an ini section.
pub fn render(options: &CopyOptions, table: Option<&str>) -> String {
    let section = table.map(table_section).unwrap_or_else(|| COPY_SECTION.to_string());
    let max_rows = options
        .max_rows
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-1".to_string());

    let mut out = format!("[{}]\n", section);
    out.push_str(&format!("concurrency = {}\n", options.concurrency));
    out.push_str(&format!("delimiter = {}\n", render_char(options.delimiter)));
    out.push_str(&format!("quote = {}\n", render_char(options.quote)));
    out.push_str(&format!("header = {}\n", options.header));
    out.push_str(&format!("null = {}\n", options.null_marker));
    out.push_str(&format!("maxrows = {}\n", max_rows));
    out.push_str(&format!("skiprows = {}\n", options.skip_rows));
    out
}

fn render_char(c: u8) -> String {
    match c {
        b'\t' => "\\t".to_string(),
        c => (c as char).to_string(),
    }
}

/// Path options are read from.
pub fn effective_path(config_path: Option<&Path>) -> Option<PathBuf> {
    config_path
        .map(Path::to_path_buf)
        .or_else(CopyOptions::default_path)
}
