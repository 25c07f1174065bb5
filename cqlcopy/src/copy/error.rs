//! Error types for the load collaborators.

use std::io;

use thiserror::Error;

use crate::error::BoxError;

/// Errors raised by a record source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O error while reading the input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input could not be parsed as delimited rows.
    #[error("malformed row: {0}")]
    Csv(#[from] csv::Error),

    /// A caller-supplied source failed.
    #[error("{0}")]
    Other(BoxError),
}

/// Errors raised while turning a record into a statement.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The row does not have one value per target column.
    #[error("expected {expected} values, got {actual}")]
    ColumnCount { expected: usize, actual: usize },

    /// A caller-supplied builder failed.
    #[error("{0}")]
    Other(BoxError),
}

/// Errors raised by a session when submitting or completing a write.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error while performing the write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The session is closed and accepts no more writes.
    #[error("session is closed")]
    Closed,

    /// The write was rejected.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// A caller-supplied session failed.
    #[error("{0}")]
    Other(BoxError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_count_display() {
        let err = BuildError::ColumnCount {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "expected 3 values, got 2");
    }

    #[test]
    fn test_source_error_from_io() {
        let err: SourceError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, SourceError::Io(_)));
        assert!(err.to_string().contains("eof"));
    }
}
