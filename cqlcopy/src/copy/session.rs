//! Sessions that execute writes.
//!
//! The [`Session`] trait is the writer's only view of the database: submit a
//! request, get back a future that completes exactly once with success or a
//! failure cause. The future is driven by the runtime the writer was given,
//! so completions may arrive on any of its worker threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use super::error::SessionError;

/// Completion handle of a submitted write.
pub type WriteFuture = BoxFuture<'static, Result<(), SessionError>>;

/// Executes writes asynchronously.
pub trait Session: Send + Sync + 'static {
    /// Request type accepted by the session.
    type Request: Send + 'static;

    /// Submit a write.
    ///
    /// An `Err` here means the write was never dispatched. Once dispatched,
    /// the outcome is reported by the returned future.
    fn execute_async(&self, request: Self::Request) -> Result<WriteFuture, SessionError>;
}

/// Session that appends statements to a CQL script file.
///
/// Each statement is written on its own line, terminated by `;`. Useful for
/// dry runs and for producing a script to replay later with a CQL shell.
#[derive(Debug)]
pub struct ScriptSession {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
    statements: Arc<AtomicU64>,
}

impl ScriptSession {
    /// Create (or truncate) the script file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        debug!(path = %path.display(), "Opened script session");
        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            statements: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of statements written so far.
    pub fn statements_written(&self) -> u64 {
        self.statements.load(Ordering::SeqCst)
    }

    /// Flush buffered statements to disk.
    pub async fn flush(&self) -> Result<(), SessionError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

impl Session for ScriptSession {
    type Request = String;

    fn execute_async(&self, statement: String) -> Result<WriteFuture, SessionError> {
        if statement.trim().is_empty() {
            return Err(SessionError::Rejected("empty statement".to_string()));
        }

        let writer = Arc::clone(&self.writer);
        let statements = Arc::clone(&self.statements);
        Ok(Box::pin(async move {
            let mut writer = writer.lock().await;
            writer.write_all(statement.as_bytes()).await?;
            writer.write_all(b";\n").await?;
            statements.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }
}
