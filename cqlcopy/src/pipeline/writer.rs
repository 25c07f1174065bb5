//! Bounded-concurrency chained writer.
//!
//! The [`ChainedWriter`] keeps a sliding window of at most `concurrency`
//! outstanding writes. It spawns one task per slot on the session's runtime;
//! each slot loops over fetch → build → submit → await, so a slot only issues
//! its next write after the previous one completed. That is the whole
//! admission control: there is no semaphore and no blocking inside a slot.
//!
//! ```text
//!                       ┌──────────── slot 0 ────────────┐
//!  RecordSource ──next──┤ fetch ► build ► submit ► await ├──┐
//!   (shared)            └────────────────▲───────────────┘  │
//!                                        └──── success ─────┘
//!                        ...  slots 1 .. concurrency-1  ...
//!
//!  insert() ──spawn slots──► CompletionLatch::wait() ──► PipelineResult
//! ```
//!
//! The first fatal error is sticky: it is recorded once, every slot observes
//! the cancellation before its next fetch, and writes already in flight are
//! left to complete. A write that succeeds after cancellation is not counted.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::latch::CompletionLatch;
use super::meter::RateMeter;
use crate::copy::{RecordSource, Session, SourceError, StatementBuilder};
use crate::error::LoadError;

/// Default number of concurrently outstanding writes.
pub const CONCURRENCY: usize = 100;

/// Configuration for the chained writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterConfig {
    /// Width of the admission window (number of slots).
    pub concurrency: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            concurrency: CONCURRENCY,
        }
    }
}

impl WriterConfig {
    /// Create a config with the given window width (at least 1).
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

/// The first fatal error of a load.
#[derive(Debug)]
pub struct FirstError {
    /// What went wrong.
    pub cause: LoadError,

    /// Index of the record associated with the failure.
    ///
    /// For fetch failures this is the last record the failing slot wrote,
    /// since no new record was obtained; `None` if the slot had not written
    /// one yet. For build, submit and write failures it is the failing
    /// record itself. Informational only.
    pub record_index: Option<u64>,
}

impl fmt::Display for FirstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record_index {
            Some(index) => write!(f, "{} (last record index: {})", self.cause, index),
            None => write!(f, "{}", self.cause),
        }
    }
}

impl std::error::Error for FirstError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Outcome of [`ChainedWriter::insert`].
#[derive(Debug)]
pub struct PipelineResult {
    /// Number of writes that completed successfully before the load ended.
    pub completed: u64,

    /// The first fatal error, if any.
    pub error: Option<FirstError>,
}

impl PipelineResult {
    /// Result of a load that had nothing to do.
    pub fn empty() -> Self {
        Self {
            completed: 0,
            error: None,
        }
    }

    /// Returns true if the load ended without a fatal error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into `Ok(completed)` or `Err(first_error)`.
    pub fn into_result(self) -> Result<u64, FirstError> {
        match self.error {
            None => Ok(self.completed),
            Some(error) => Err(error),
        }
    }
}

/// Sticky first error plus the cancellation flag, shared by every slot.
#[derive(Debug, Default)]
struct AbortState {
    cancellation: CancellationToken,
    first_error: Mutex<Option<FirstError>>,
}

impl AbortState {
    /// Record `cause` if no error is recorded yet, then cancel.
    ///
    /// Returns true if this call's error was the one recorded.
    fn abort(&self, cause: LoadError, record_index: Option<u64>) -> bool {
        let recorded = {
            let mut first_error = self.first_error.lock();
            if first_error.is_none() {
                warn!(error = %cause, record_index, "Aborting load");
                *first_error = Some(FirstError {
                    cause,
                    record_index,
                });
                true
            } else {
                debug!(error = %cause, record_index, "Load already aborted, dropping error");
                false
            }
        };
        self.cancellation.cancel();
        recorded
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn take_error(&self) -> Option<FirstError> {
        self.first_error.lock().take()
    }
}

/// Handle that interrupts a running load from another thread.
///
/// Interrupting records [`LoadError::Interrupted`] as the first error (unless
/// a failure was already recorded) and cancels every slot. Writes in flight
/// still complete.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    abort: Arc<AbortState>,
}

impl InterruptHandle {
    /// Interrupt the load.
    pub fn interrupt(&self) {
        if self.abort.abort(LoadError::Interrupted, None) {
            info!("Load interrupted");
        }
    }

    /// Returns true once the load has been cancelled for any reason.
    pub fn is_cancelled(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// State shared between the writer and its slot tasks.
struct WriterShared<S, R, B> {
    session: Arc<S>,
    source: Arc<R>,
    builder: B,
    meter: Arc<RateMeter>,
    abort: Arc<AbortState>,
    latch: CompletionLatch,
}

impl<S, R, B> WriterShared<S, R, B>
where
    S: Session,
    R: RecordSource,
    B: StatementBuilder<R::Record, Request = S::Request>,
{
    /// Run one slot and count it down on the latch when it ends.
    ///
    /// A panic in a collaborator goes through the abort path like any other
    /// fatal error, attributed to the record the slot was handling.
    async fn run_slot(self: Arc<Self>, slot: usize) {
        let _slot_guard = self.latch.slot_guard();
        let mut current: Option<u64> = None;

        let outcome = AssertUnwindSafe(self.drive_slot(slot, &mut current))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            self.abort.abort(LoadError::Panicked(message), current);
        }
    }

    /// Loop until the source is exhausted, the load is cancelled, or this
    /// slot hits a fatal error.
    ///
    /// `current` tracks the index of the last record this slot fetched.
    async fn drive_slot(&self, slot: usize, current: &mut Option<u64>) {
        let mut completed: Option<u64> = None;

        loop {
            if self.abort.is_cancelled() {
                debug!(slot, "Slot observed cancellation");
                return;
            }

            if completed.is_some() {
                self.meter.mark_written();
            }

            let (index, record) = match self.fetch().await {
                Ok(Some(next)) => next,
                Ok(None) => {
                    debug!(slot, "Slot finished, source exhausted");
                    return;
                }
                Err(e) => {
                    self.abort.abort(LoadError::Fetch(e), completed);
                    return;
                }
            };
            *current = Some(index);
            self.meter.mark_read();

            if self.abort.is_cancelled() {
                debug!(slot, record_index = index, "Slot observed cancellation after fetch");
                return;
            }

            let write = match self
                .builder
                .build(record)
                .map_err(LoadError::Build)
                .and_then(|request| {
                    self.session
                        .execute_async(request)
                        .map_err(LoadError::Submit)
                }) {
                Ok(write) => write,
                Err(e) => {
                    self.abort.abort(e, Some(index));
                    return;
                }
            };

            match write.await {
                Ok(()) => completed = Some(index),
                Err(e) => {
                    self.abort.abort(LoadError::Write(e), Some(index));
                    return;
                }
            }
        }
    }

    /// Fetch the next record on the blocking pool.
    ///
    /// Sources may do synchronous I/O, which must stay off the workers that
    /// drive the session futures.
    async fn fetch(&self) -> Result<Option<(u64, R::Record)>, SourceError> {
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || source.next_record()).await {
            Ok(fetched) => fetched,
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(e) => Err(SourceError::Other(Box::new(e))),
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives a bounded window of asynchronous writes from a record source.
///
/// # Type Parameters
///
/// * `S` - Session that executes the writes
/// * `R` - Source of records
/// * `B` - Builder turning records into session requests
pub struct ChainedWriter<S, R, B> {
    runtime: Handle,
    concurrency: usize,
    shared: Arc<WriterShared<S, R, B>>,
}

impl<S, R, B> ChainedWriter<S, R, B>
where
    S: Session,
    R: RecordSource,
    B: StatementBuilder<R::Record, Request = S::Request>,
{
    /// Create a writer.
    ///
    /// # Arguments
    ///
    /// * `runtime` - Runtime the slot tasks and session futures run on
    /// * `config` - Writer configuration
    /// * `session` - Session executing the writes
    /// * `source` - Source of records
    /// * `builder` - Builder for session requests
    /// * `meter` - Meter receiving read/written events and progress output
    pub fn new(
        runtime: Handle,
        config: WriterConfig,
        session: Arc<S>,
        source: Arc<R>,
        builder: B,
        meter: Arc<RateMeter>,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        Self {
            runtime,
            concurrency,
            shared: Arc::new(WriterShared {
                session,
                source,
                builder,
                meter,
                abort: Arc::new(AbortState::default()),
                latch: CompletionLatch::new(concurrency),
            }),
        }
    }

    /// Width of the admission window.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns a handle that can interrupt this load from another thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            abort: Arc::clone(&self.shared.abort),
        }
    }

    /// Load every record and block until all slots have terminated.
    ///
    /// Returns immediately with an empty result if the source is empty.
    /// Must be called from outside the writer's runtime: the calling thread
    /// blocks on a latch that the runtime's tasks release.
    pub fn insert(self) -> PipelineResult {
        if self.shared.source.is_empty() {
            debug!("Record source is empty, nothing to load");
            return PipelineResult::empty();
        }

        let started = Instant::now();
        let finished_before = self.shared.meter.num_finished();
        info!(concurrency = self.concurrency, "Starting chained writer");

        for slot in 0..self.concurrency {
            let shared = Arc::clone(&self.shared);
            self.runtime.spawn(shared.run_slot(slot));
        }

        self.shared.latch.wait();
        self.shared.meter.finish();

        let completed = self.shared.meter.num_finished() - finished_before;
        let error = self.shared.abort.take_error();
        info!(
            completed,
            failed = error.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chained writer finished"
        );

        PipelineResult { completed, error }
    }
}

/// Load every record from `source` into `session` with the default window.
///
/// Convenience wrapper around [`ChainedWriter`].
pub fn insert_concurrent<S, R, B>(
    runtime: Handle,
    session: Arc<S>,
    source: Arc<R>,
    builder: B,
    meter: Arc<RateMeter>,
) -> PipelineResult
where
    S: Session,
    R: RecordSource,
    B: StatementBuilder<R::Record, Request = S::Request>,
{
    ChainedWriter::new(
        runtime,
        WriterConfig::default(),
        session,
        source,
        builder,
        meter,
    )
    .insert()
}
