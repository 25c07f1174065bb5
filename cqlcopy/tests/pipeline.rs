//! End-to-end tests of the chained writer against a scripted session.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cqlcopy::copy::{
    BuildError, CsvSource, InsertBuilder, IterSource, ScriptSession, Session, SessionError,
    SourceError, WriteFuture,
};
use cqlcopy::pipeline::{ChainedWriter, PipelineResult, RateMeter, WriterConfig};
use cqlcopy::LoadError;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn quiet_meter() -> Arc<RateMeter> {
    Arc::new(RateMeter::with_output(io::sink()))
}

fn identity(record: u64) -> Result<u64, BuildError> {
    Ok(record)
}

/// Session whose writes complete after a delay, failing for chosen records.
///
/// Failing writes complete immediately so they race ahead of slower
/// successes, which is when abort handling matters most.
struct ScriptedSession {
    failing: HashSet<u64>,
    refusing: HashSet<u64>,
    delay: Duration,
    submitted: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedSession {
    fn new(delay: Duration) -> Self {
        Self {
            failing: HashSet::new(),
            refusing: HashSet::new(),
            delay,
            submitted: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(indices);
        self
    }

    /// Refuse to dispatch these requests at submit time.
    fn refusing(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.refusing.extend(indices);
        self
    }

    fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Session for ScriptedSession {
    type Request = u64;

    fn execute_async(&self, request: u64) -> Result<WriteFuture, SessionError> {
        if self.refusing.contains(&request) {
            return Err(SessionError::Closed);
        }
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let fail = self.failing.contains(&request);
        let delay = self.delay;
        let in_flight = Arc::clone(&self.in_flight);
        Ok(Box::pin(async move {
            if !fail {
                tokio::time::sleep(delay).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            if fail {
                Err(SessionError::Rejected(format!("record {}", request)))
            } else {
                Ok(())
            }
        }))
    }
}

fn load(
    rt: &Runtime,
    concurrency: usize,
    session: &Arc<ScriptedSession>,
    records: u64,
) -> PipelineResult {
    ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(concurrency),
        Arc::clone(session),
        Arc::new(IterSource::from_values(0..records)),
        identity,
        quiet_meter(),
    )
    .insert()
}

#[test]
fn fewer_records_than_slots() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(2)));

    let result = load(&rt, 100, &session, 10);

    assert!(result.is_success());
    assert_eq!(result.completed, 10);
    assert_eq!(session.submitted(), 10);
}

#[test]
fn more_records_than_slots() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(1)));

    let result = load(&rt, 100, &session, 5_000);

    assert!(result.is_success());
    assert_eq!(result.completed, 5_000);
    assert_eq!(session.submitted(), 5_000);
}

#[test]
fn in_flight_writes_never_exceed_window() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(2)));

    let result = load(&rt, 7, &session, 300);

    assert_eq!(result.completed, 300);
    assert!(session.max_in_flight() <= 7, "saw {}", session.max_in_flight());
    assert!(session.max_in_flight() >= 1);
}

#[test]
fn single_remote_failure_stops_the_load() {
    let rt = runtime();
    let concurrency = 10;
    let failing_index = 500;
    let session = Arc::new(
        ScriptedSession::new(Duration::from_millis(5)).failing([failing_index]),
    );

    let result = load(&rt, concurrency, &session, 10_000);

    let error = result.error.expect("load should fail");
    assert_eq!(error.record_index, Some(failing_index));
    assert!(matches!(error.cause, LoadError::Write(SessionError::Rejected(_))));
    assert!(result.completed < 10_000);
    // Each slot may fetch at most once more after the failure is recorded,
    // and writes in flight at that moment still finish.
    let bound = failing_index as usize + 1 + 2 * concurrency;
    assert!(session.submitted() <= bound, "submitted {}", session.submitted());
}

#[test]
fn concurrent_failures_record_exactly_one() {
    let rt = runtime();
    let failing: Vec<u64> = (100..140).collect();
    let session = Arc::new(
        ScriptedSession::new(Duration::from_millis(1)).failing(failing.iter().copied()),
    );

    let result = load(&rt, 50, &session, 1_000);

    let error = result.error.expect("load should fail");
    let index = error.record_index.expect("remote failures carry an index");
    assert!(failing.contains(&index), "unexpected index {}", index);
    assert!(result.completed < 1_000);
}

#[test]
fn empty_source_makes_no_session_calls() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(1)));

    let result = load(&rt, 100, &session, 0);

    assert_eq!(result.completed, 0);
    assert!(result.error.is_none());
    assert_eq!(session.submitted(), 0);
}

#[test]
fn fetch_failure_with_single_slot() {
    let rt = runtime();
    let failing_at = 20u64;
    let items: Vec<Result<u64, io::Error>> = (0..100u64)
        .map(|i| {
            if i == failing_at {
                Err(io::Error::new(io::ErrorKind::InvalidData, "torn row"))
            } else {
                Ok(i)
            }
        })
        .collect();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(1)));

    let result = ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(1),
        Arc::clone(&session),
        Arc::new(IterSource::new(items)),
        identity,
        quiet_meter(),
    )
    .insert();

    assert_eq!(result.completed, failing_at);
    assert_eq!(session.submitted() as u64, failing_at);
    let error = result.error.expect("load should fail");
    assert_eq!(error.record_index, Some(failing_at - 1));
    assert!(matches!(error.cause, LoadError::Fetch(SourceError::Other(_))));
}

#[test]
fn submit_failure_is_attributed_to_refused_record() {
    let rt = runtime();
    let refused = 300;
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(1)).refusing([refused]));

    let result = load(&rt, 8, &session, 10_000);

    let error = result.error.expect("load should fail");
    assert_eq!(error.record_index, Some(refused));
    assert!(matches!(error.cause, LoadError::Submit(SessionError::Closed)));
    assert!(result.completed < 10_000);
    assert!(session.submitted() < 10_000);
}

#[test]
fn build_failure_is_fatal() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(1)));
    let builder = |record: u64| -> Result<u64, BuildError> {
        if record == 42 {
            Err(BuildError::Other("unencodable".into()))
        } else {
            Ok(record)
        }
    };

    let result = ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(4),
        Arc::clone(&session),
        Arc::new(IterSource::from_values(0..1_000u64)),
        builder,
        quiet_meter(),
    )
    .insert();

    let error = result.error.expect("load should fail");
    assert_eq!(error.record_index, Some(42));
    assert!(matches!(error.cause, LoadError::Build(_)));
    assert!(result.completed < 1_000);
}

#[test]
fn interrupt_during_load() {
    let rt = runtime();
    let session = Arc::new(ScriptedSession::new(Duration::from_millis(5)));
    let writer = ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(4),
        Arc::clone(&session),
        Arc::new(IterSource::from_values(0..100_000u64)),
        identity,
        quiet_meter(),
    );
    let handle = writer.interrupt_handle();

    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.interrupt();
    });
    let result = writer.insert();
    interrupter.join().unwrap();

    let error = result.error.expect("load should be interrupted");
    assert!(error.cause.is_interrupted());
    assert!(result.completed < 100_000);
}

#[test]
fn csv_file_to_script() {
    let rt = runtime();
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("users.csv");
    let output = dir.path().join("users.cql");
    std::fs::write(&input, "id,name\n1,alice\n2,bob\n3,\n").unwrap();

    let options = cqlcopy::config::CopyOptions::default().with_header(true);
    let source = CsvSource::from_path(&input, &options).unwrap();
    let session = Arc::new(rt.block_on(ScriptSession::create(&output)).unwrap());
    let builder = InsertBuilder::new("ks.users", vec!["id".into(), "name".into()]);

    let result = ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(2),
        Arc::clone(&session),
        Arc::new(source),
        builder,
        quiet_meter(),
    )
    .insert();
    rt.block_on(session.flush()).unwrap();

    assert!(result.is_success());
    assert_eq!(result.completed, 3);
    assert_eq!(session.statements_written(), 3);

    let mut lines: Vec<String> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "INSERT INTO ks.users (id, name) VALUES (1, 'alice');",
            "INSERT INTO ks.users (id, name) VALUES (2, 'bob');",
            "INSERT INTO ks.users (id, name) VALUES (3, null);",
        ]
    );
}

#[test]
fn malformed_csv_width_is_build_failure() {
    let rt = runtime();
    let dir = tempfile::TempDir::new().unwrap();
    let output = dir.path().join("t.cql");
    let data = "1,a\n2\n3,c\n";

    let source = CsvSource::new(
        io::Cursor::new(data.as_bytes().to_vec()),
        &cqlcopy::config::CopyOptions::default(),
    );
    let session = Arc::new(rt.block_on(ScriptSession::create(&output)).unwrap());
    let builder = InsertBuilder::new("t", vec!["a".into(), "b".into()]);

    let result = ChainedWriter::new(
        rt.handle().clone(),
        WriterConfig::with_concurrency(1),
        session,
        Arc::new(source),
        builder,
        quiet_meter(),
    )
    .insert();

    let error = result.error.expect("load should fail");
    assert_eq!(error.record_index, Some(1));
    assert!(matches!(
        error.cause,
        LoadError::Build(BuildError::ColumnCount {
            expected: 2,
            actual: 1
        })
    ));
    assert_eq!(result.completed, 1);
}
