//! Collaborators of the chained writer.
//!
//! The writer depends on three narrow interfaces, each with stock
//! implementations:
//!
//! ```text
//! RecordSource ──► StatementBuilder ──► Session
//!   IterSource       InsertBuilder        ScriptSession
//!   CsvSource        Fn(T) -> Result
//! ```
//!
//! - [`RecordSource`]: hands out `(index, record)` pairs, safe under concurrent calls
//! - [`StatementBuilder`]: turns a record into a request; may fail per record
//! - [`Session`]: submits a request and reports completion through a future

mod error;
mod session;
mod source;
mod statement;

pub use error::{BuildError, SessionError, SourceError};
pub use session::{ScriptSession, Session, WriteFuture};
pub use source::{CsvSource, IterSource, RecordSource};
pub use statement::{cql_literal, InsertBuilder, StatementBuilder, DEFAULT_NULL_MARKER};
