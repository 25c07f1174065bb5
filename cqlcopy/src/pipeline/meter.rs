//! Throughput metering for bulk loads.
//!
//! [`RateMeter`] counts finished writes and keeps two exponentially-weighted
//! moving averages, one for records read and one for records written. The
//! averages use a one-minute decay constant and are ticked every five seconds,
//! the same way a system load average is computed.
//!
//! Every 1000 finished writes the meter rewrites a single progress line in
//! place:
//!
//! ```text
//! Imported 42000 rows; Read: 5120.33 rows/s; Insert: 5087.12 rows/s\r
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Interval at which the moving averages are updated.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Decay window of the moving averages.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Number of finished writes between progress lines.
pub const PROGRESS_EVERY: u64 = 1000;

/// Exponentially-weighted moving average ticked at a fixed interval.
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    interval_secs: f64,
    uncounted: u64,
    rate: Option<f64>,
}

impl Ewma {
    fn new(window: Duration, interval: Duration) -> Self {
        let interval_secs = interval.as_secs_f64();
        Self {
            alpha: 1.0 - (-interval_secs / window.as_secs_f64()).exp(),
            interval_secs,
            uncounted: 0,
            rate: None,
        }
    }

    fn update(&mut self, n: u64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / self.interval_secs;
        self.uncounted = 0;
        self.rate = Some(match self.rate {
            Some(rate) => rate + self.alpha * (instant_rate - rate),
            None => instant_rate,
        });
    }

    /// Events per second, or 0 before the first tick.
    fn rate(&self) -> f64 {
        self.rate.unwrap_or(0.0)
    }
}

#[derive(Debug)]
struct EventMeterState {
    ewma: Ewma,
    last_tick: Instant,
    count: u64,
}

impl EventMeterState {
    fn tick_if_necessary(&mut self, now: Instant) {
        let age = now.saturating_duration_since(self.last_tick);
        if age < TICK_INTERVAL {
            return;
        }
        let ticks = (age.as_nanos() / TICK_INTERVAL.as_nanos()) as u32;
        self.last_tick += TICK_INTERVAL * ticks;
        for _ in 0..ticks {
            self.ewma.tick();
        }
    }
}

/// One labelled event stream with a one-minute moving average.
#[derive(Debug)]
struct EventMeter {
    state: Mutex<EventMeterState>,
}

impl EventMeter {
    fn new(start: Instant) -> Self {
        Self {
            state: Mutex::new(EventMeterState {
                ewma: Ewma::new(RATE_WINDOW, TICK_INTERVAL),
                last_tick: start,
                count: 0,
            }),
        }
    }

    fn mark_at(&self, now: Instant) {
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        state.ewma.update(1);
        state.count += 1;
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        state.ewma.rate()
    }

    fn count(&self) -> u64 {
        self.state.lock().count
    }
}

/// Shared read/write meter for one or more bulk loads.
///
/// All operations take `&self` and are safe to call concurrently from any
/// number of pipeline slots.
pub struct RateMeter {
    finished: AtomicU64,
    read: EventMeter,
    written: EventMeter,
    progress: Mutex<Box<dyn Write + Send>>,
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateMeter")
            .field("finished", &self.num_finished())
            .field("read", &self.read.count())
            .field("written", &self.written.count())
            .finish()
    }
}

impl RateMeter {
    /// Create a meter that reports progress on standard output.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Create a meter that reports progress on the given stream.
    pub fn with_output(output: impl Write + Send + 'static) -> Self {
        Self::starting_at(Instant::now(), Box::new(output))
    }

    fn starting_at(start: Instant, output: Box<dyn Write + Send>) -> Self {
        Self {
            finished: AtomicU64::new(0),
            read: EventMeter::new(start),
            written: EventMeter::new(start),
            progress: Mutex::new(output),
        }
    }

    /// Record one record read from the source.
    pub fn mark_read(&self) {
        self.mark_read_at(Instant::now());
    }

    /// Record one finished write.
    ///
    /// Emits a progress line when the finished count reaches a multiple of
    /// [`PROGRESS_EVERY`].
    pub fn mark_written(&self) {
        self.mark_written_at(Instant::now());
    }

    fn mark_read_at(&self, now: Instant) {
        self.read.mark_at(now);
    }

    fn mark_written_at(&self, now: Instant) {
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        self.written.mark_at(now);
        if finished % PROGRESS_EVERY == 0 {
            self.report(finished, now);
        }
    }

    /// Smoothed read rate in rows per second.
    pub fn current_read_rate(&self) -> f64 {
        self.read.rate_at(Instant::now())
    }

    /// Smoothed write rate in rows per second.
    pub fn current_written_rate(&self) -> f64 {
        self.written.rate_at(Instant::now())
    }

    /// Total number of finished writes.
    pub fn num_finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    /// Total number of records read.
    pub fn num_read(&self) -> u64 {
        self.read.count()
    }

    /// Terminate the in-place progress line.
    pub fn finish(&self) {
        let mut output = self.progress.lock();
        if let Err(e) = output.write_all(b"\n").and_then(|_| output.flush()) {
            debug!(error = %e, "Failed to terminate progress line");
        }
    }

    fn report(&self, finished: u64, now: Instant) {
        let line = progress_line(
            finished,
            self.read.rate_at(now),
            self.written.rate_at(now),
        );
        let mut output = self.progress.lock();
        if let Err(e) = output
            .write_all(line.as_bytes())
            .and_then(|_| output.flush())
        {
            debug!(error = %e, finished, "Failed to write progress line");
        }
    }
}

/// Format the in-place progress line.
pub fn progress_line(finished: u64, read_rate: f64, written_rate: f64) -> String {
    format!(
        "Imported {} rows; Read: {:.2} rows/s; Insert: {:.2} rows/s\r",
        finished, read_rate, written_rate
    )
}
