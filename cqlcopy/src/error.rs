//! Fatal load errors.

use thiserror::Error;

use crate::copy::{BuildError, SessionError, SourceError};

/// Boxed error used for causes raised by caller-supplied collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that abort a bulk load.
///
/// Exhaustion of the record source is not an error and never appears here.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The record source failed while fetching the next record.
    #[error("failed to read record: {0}")]
    Fetch(#[source] SourceError),

    /// The statement for a record could not be built.
    #[error("failed to build statement: {0}")]
    Build(#[source] BuildError),

    /// The session refused the write before it was dispatched.
    #[error("failed to submit write: {0}")]
    Submit(#[source] SessionError),

    /// A dispatched write failed remotely.
    #[error("write failed: {0}")]
    Write(#[source] SessionError),

    /// A collaborator panicked while a slot was running it.
    #[error("load panicked: {0}")]
    Panicked(String),

    /// The load was interrupted by the user.
    #[error("load interrupted")]
    Interrupted,
}

impl LoadError {
    /// Returns true if this error was caused by an interrupt rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, LoadError::Interrupted)
    }
}
