//! Bulk-load pipeline.
//!
//! - [`ChainedWriter`]: bounded window of asynchronous writes fed by a record source
//! - [`RateMeter`]: read/written counters, smoothed rates and progress output
//! - [`CompletionLatch`]: joins the writer's slots on the calling thread

mod latch;
mod meter;
mod writer;

pub use latch::{CompletionLatch, SlotGuard};
pub use meter::{progress_line, RateMeter, PROGRESS_EVERY, RATE_WINDOW, TICK_INTERVAL};
pub use writer::{
    insert_concurrent, ChainedWriter, FirstError, InterruptHandle, PipelineResult, WriterConfig,
    CONCURRENCY,
};
