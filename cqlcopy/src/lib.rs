//! cqlcopy - bulk loading for CQL tables
//!
//! This library drives a bounded window of asynchronous writes against a
//! database session. Records are pulled from a [`copy::RecordSource`], turned
//! into statements by a [`copy::StatementBuilder`], and submitted through a
//! [`copy::Session`]. The [`pipeline::ChainedWriter`] keeps at most
//! `concurrency` writes outstanding, stops every slot on the first fatal error,
//! and reports throughput through a shared [`pipeline::RateMeter`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cqlcopy::copy::{InsertBuilder, IterSource, ScriptSession};
//! use cqlcopy::pipeline::{ChainedWriter, RateMeter, WriterConfig};
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let session = Arc::new(runtime.block_on(ScriptSession::create("users.cql"))?);
//! let source = Arc::new(IterSource::from_values(rows));
//! let builder = InsertBuilder::new("ks.users", vec!["id".into(), "name".into()]);
//!
//! let writer = ChainedWriter::new(
//!     runtime.handle().clone(),
//!     WriterConfig::default(),
//!     session,
//!     source,
//!     builder,
//!     Arc::new(RateMeter::new()),
//! );
//! let result = writer.insert();
//! println!("{} rows imported", result.completed);
//! ```

pub mod config;
pub mod copy;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use error::{BoxError, LoadError};
