//! Load options.
//!
//! `CopyOptions` collects the settings of one load: window width, the
//! delimited-file dialect, and row limits. Options come from an ini file:
//!
//! ```ini
//! [copy]
//! concurrency = 200
//! delimiter = |
//! header = true
//!
//! [copy:ks.users]
//! null = NULL
//! maxrows = 10000
//! ```
//!
//! Keys in `[copy:<table>]` override `[copy]` for that table. Keys are
//! case-insensitive. Unknown keys are ignored.

use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use thiserror::Error;
use tracing::debug;

use crate::copy::DEFAULT_NULL_MARKER;
use crate::pipeline::{WriterConfig, CONCURRENCY};

/// Section holding options for every table.
pub const COPY_SECTION: &str = "copy";

/// Name of the config file under the user's config directory.
pub const CONFIG_FILE_NAME: &str = "cqlcopyrc";

/// Errors from loading options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("invalid value '{value}' for '{key}' in [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Options for one load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CopyOptions {
    /// Number of concurrently outstanding writes.
    pub concurrency: usize,

    /// Field delimiter.
    pub delimiter: u8,

    /// Quote character.
    pub quote: u8,

    /// Whether the first row is a header to skip.
    pub header: bool,

    /// Field value that loads as `null`.
    pub null_marker: String,

    /// Maximum number of rows to load; `None` loads everything.
    pub max_rows: Option<u64>,

    /// Number of rows to skip before loading.
    pub skip_rows: u64,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            concurrency: CONCURRENCY,
            delimiter: b',',
            quote: b'"',
            header: false,
            null_marker: DEFAULT_NULL_MARKER.to_string(),
            max_rows: None,
            skip_rows: 0,
        }
    }
}

impl CopyOptions {
    /// Set the window width (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quote character.
    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    /// Set whether the first row is a header.
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Set the null marker.
    pub fn with_null_marker(mut self, marker: impl Into<String>) -> Self {
        self.null_marker = marker.into();
        self
    }

    /// Set the row limit.
    pub fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Set the number of leading rows to skip.
    pub fn with_skip_rows(mut self, skip_rows: u64) -> Self {
        self.skip_rows = skip_rows;
        self
    }

    /// Writer configuration derived from these options.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig::with_concurrency(self.concurrency)
    }

    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cqlcopy").join(CONFIG_FILE_NAME))
    }

    /// Load options for `table` from `path`, or from [`default_path`] if
    /// `path` is `None`.
    ///
    /// A missing file yields the defaults.
    ///
    /// [`default_path`]: CopyOptions::default_path
    pub fn load(path: Option<&Path>, table: Option<&str>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file_opt(&path, parse_option()).map_err(|source| {
            ConfigError::Read {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_ini(&ini, table)
    }

    /// Build options from parsed ini contents.
    pub fn from_ini(ini: &Ini, table: Option<&str>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        options.apply_section(ini, COPY_SECTION)?;
        if let Some(table) = table {
            options.apply_section(ini, &table_section(table))?;
        }
        Ok(options)
    }

    fn apply_section(&mut self, ini: &Ini, section: &str) -> Result<(), ConfigError> {
        let Some(properties) = ini.section(Some(section)) else {
            return Ok(());
        };

        for (key, value) in properties.iter() {
            let value = value.trim();
            let invalid = |reason: &str| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            };

            match key.to_ascii_lowercase().as_str() {
                "concurrency" => {
                    let n: usize = value
                        .parse()
                        .map_err(|_| invalid("expected a positive integer"))?;
                    if n == 0 {
                        return Err(invalid("must be at least 1"));
                    }
                    self.concurrency = n;
                }
                "delimiter" => {
                    self.delimiter = parse_char(value)
                        .ok_or_else(|| invalid("expected a single ASCII character"))?;
                }
                "quote" => {
                    self.quote = parse_char(value)
                        .ok_or_else(|| invalid("expected a single ASCII character"))?;
                }
                "header" => {
                    self.header =
                        parse_bool(value).ok_or_else(|| invalid("expected true or false"))?;
                }
                "null" => self.null_marker = value.to_string(),
                "maxrows" => {
                    let n: i64 = value.parse().map_err(|_| invalid("expected an integer"))?;
                    self.max_rows = match n {
                        -1 => None,
                        n if n < 0 => {
                            return Err(invalid("expected -1 or a non-negative integer"))
                        }
                        n => Some(n as u64),
                    };
                }
                "skiprows" => {
                    self.skip_rows = value
                        .parse()
                        .map_err(|_| invalid("expected a non-negative integer"))?;
                }
                other => debug!(section, key = other, "Ignoring unknown config key"),
            }
        }
        Ok(())
    }
}

/// Backslashes are kept as written so `\t` reaches [`parse_char`].
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Name of the per-table override section.
pub fn table_section(table: &str) -> String {
    format!("{}:{}", COPY_SECTION, table)
}

/// Parse a single ASCII character, accepting `\t` for tab.
pub fn parse_char(value: &str) -> Option<u8> {
    if value == "\\t" {
        return Some(b'\t');
    }
    match value.as_bytes() {
        [c] if c.is_ascii() => Some(*c),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(contents: &str, table: Option<&str>) -> Result<CopyOptions, ConfigError> {
        let ini = Ini::load_from_str_opt(contents, parse_option()).unwrap();
        CopyOptions::from_ini(&ini, table)
    }

    #[test]
    fn test_defaults() {
        let options = CopyOptions::default();
        assert_eq!(options.concurrency, CONCURRENCY);
        assert_eq!(options.delimiter, b',');
        assert_eq!(options.quote, b'"');
        assert!(!options.header);
        assert_eq!(options.null_marker, "");
        assert_eq!(options.max_rows, None);
        assert_eq!(options.skip_rows, 0);
        assert_eq!(options.writer_config(), WriterConfig::default());
    }

    #[test]
    fn test_copy_section() {
        let options = parse(
            "[copy]\nconcurrency = 8\ndelimiter = |\nHEADER = yes\nnull = NULL\nmaxrows = 5\nskiprows = 2\n",
            None,
        )
        .unwrap();

        assert_eq!(
            options,
            CopyOptions::default()
                .with_concurrency(8)
                .with_delimiter(b'|')
                .with_header(true)
                .with_null_marker("NULL")
                .with_max_rows(Some(5))
                .with_skip_rows(2)
        );
    }

    #[test]
    fn test_table_section_overrides() {
        let contents = "[copy]\nconcurrency = 8\nheader = true\n\n[copy:ks.users]\nconcurrency = 2\n";

        let users = parse(contents, Some("ks.users")).unwrap();
        assert_eq!(users.concurrency, 2);
        assert!(users.header);

        let other = parse(contents, Some("ks.events")).unwrap();
        assert_eq!(other.concurrency, 8);
    }

    #[test]
    fn test_max_rows_minus_one_is_unlimited() {
        let options = parse("[copy]\nmaxrows = 10\n[copy:t]\nmaxrows = -1\n", Some("t")).unwrap();
        assert_eq!(options.max_rows, None);
    }

    #[test]
    fn test_tab_delimiter() {
        let options = parse("[copy]\ndelimiter = \\t\n", None).unwrap();
        assert_eq!(options.delimiter, b'\t');
    }

    #[test]
    fn test_invalid_values() {
        for contents in [
            "[copy]\nconcurrency = many\n",
            "[copy]\nconcurrency = 0\n",
            "[copy]\ndelimiter = ||\n",
            "[copy]\nheader = maybe\n",
            "[copy]\nmaxrows = -2\n",
            "[copy]\nskiprows = -1\n",
        ] {
            let err = parse(contents, None).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{}", contents);
        }
    }

    #[test]
    fn test_invalid_value_message() {
        let err = parse("[copy:t]\nquote = ab\n", Some("t")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value 'ab' for 'quote' in [copy:t]: expected a single ASCII character"
        );
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let options = CopyOptions::load(Some(&dir.path().join("absent")), None).unwrap();
        assert_eq!(options, CopyOptions::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[copy]\nconcurrency = 3\n").unwrap();

        let options = CopyOptions::load(Some(&path), Some("ks.t")).unwrap();
        assert_eq!(options.concurrency, 3);
    }

    #[test]
    fn test_load_unreadable_file() {
        let dir = TempDir::new().unwrap();
        // A directory exists but cannot be read as a file.
        let err = CopyOptions::load(Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = CopyOptions::default_path() {
            assert!(path.ends_with("cqlcopy/cqlcopyrc"));
        }
    }
}
