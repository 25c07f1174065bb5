//! CLI error type.

use std::fmt;
use std::io;

use cqlcopy::config::ConfigError;
use cqlcopy::copy::{SessionError, SourceError};
use cqlcopy::logging::LoggingError;
use cqlcopy::pipeline::FirstError;

/// Exit code for a load stopped by Ctrl-C.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Options could not be loaded.
    Config(ConfigError),

    /// Logging could not be set up.
    Logging(LoggingError),

    /// Invalid command-line argument.
    InvalidArgument(String),

    /// Input file could not be opened.
    Source(SourceError),

    /// Output script could not be created or flushed.
    Session(SessionError),

    /// The async runtime could not be started.
    Runtime(io::Error),

    /// The Ctrl-C handler could not be installed.
    Signal(String),

    /// The load stopped on a fatal error.
    Load { completed: u64, error: FirstError },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Load { error, .. } if error.cause.is_interrupted() => EXIT_INTERRUPTED,
            Self::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Logging(e) => write!(f, "Logging error: {}", e),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::Source(e) => write!(f, "Cannot read input: {}", e),
            Self::Session(e) => write!(f, "Cannot write output: {}", e),
            Self::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            Self::Signal(msg) => write!(f, "Failed to install Ctrl-C handler: {}", msg),
            Self::Load { completed, error } => {
                write!(f, "Failed to import {} rows: {}", completed, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Logging(e) => Some(e),
            Self::Source(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Runtime(e) => Some(e),
            Self::Load { error, .. } => Some(error),
            Self::InvalidArgument(_) | Self::Signal(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        Self::Logging(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}
