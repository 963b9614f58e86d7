//! Completion audit log.
//!
//! Every generation attempt is written here for offline inspection. Callers
//! treat a failed write as a warning: the log must never fail a turn.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use crate::TelemetryResult;

/// What a completion was asked to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// The agent's reply to an inbound message.
    Response,
    /// An array of structured objects, e.g. extracted facts.
    ObjectArray,
    /// A list of names, e.g. the evaluators to run.
    NameList,
}

/// A single audited completion attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionLogEntry {
    /// Caller-supplied request context (room, sender, attempt, ...).
    pub request: Value,
    /// Rendered prompt sent to the backend.
    pub prompt: String,
    /// Raw backend output; `None` when the call timed out.
    pub raw_response: Option<String>,
    /// What the completion was for.
    pub kind: CompletionKind,
    /// When the attempt finished.
    pub created_at: DateTime<Utc>,
}

impl CompletionLogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        kind: CompletionKind,
        request: Value,
        prompt: impl Into<String>,
        raw_response: Option<String>,
    ) -> Self {
        Self {
            request,
            prompt: prompt.into(),
            raw_response,
            kind,
            created_at: Utc::now(),
        }
    }
}

/// Sink for completion audit entries.
#[async_trait]
pub trait CompletionLog: Send + Sync {
    /// Records an entry.
    async fn record(&self, entry: &CompletionLogEntry) -> TelemetryResult<()>;

    /// Returns the most recent `limit` entries, oldest first.
    async fn tail(&self, limit: usize) -> TelemetryResult<Vec<CompletionLogEntry>>;
}

/// Newline-delimited JSON audit log on disk.
#[derive(Debug)]
pub struct FileCompletionLog {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl FileCompletionLog {
    /// Opens (or creates) the log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> TelemetryResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionLog for FileCompletionLog {
    async fn record(&self, entry: &CompletionLogEntry) -> TelemetryResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.flush().await?;
        Ok(())
    }

    async fn tail(&self, limit: usize) -> TelemetryResult<Vec<CompletionLogEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path).await?;
        let lines: Vec<&[u8]> = data
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .collect();
        let skip = lines.len().saturating_sub(limit);
        lines[skip..]
            .iter()
            .map(|line| serde_json::from_slice(line).map_err(Into::into))
            .collect()
    }
}

/// Emits entries as `info` events on the `completion_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCompletionLog;

#[async_trait]
impl CompletionLog for TracingCompletionLog {
    async fn record(&self, entry: &CompletionLogEntry) -> TelemetryResult<()> {
        info!(
            target: "completion_audit",
            kind = ?entry.kind,
            request = %entry.request,
            prompt_chars = entry.prompt.len(),
            response = entry.raw_response.as_deref().unwrap_or("<timeout>"),
            "completion recorded"
        );
        Ok(())
    }

    async fn tail(&self, _limit: usize) -> TelemetryResult<Vec<CompletionLogEntry>> {
        Ok(Vec::new())
    }
}

/// Keeps entries in memory. Useful for tests.
#[derive(Debug, Default)]
pub struct CollectingCompletionLog {
    entries: StdMutex<Vec<CompletionLogEntry>>,
}

impl CollectingCompletionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded entry.
    #[must_use]
    pub fn entries(&self) -> Vec<CompletionLogEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionLog for CollectingCompletionLog {
    async fn record(&self, entry: &CompletionLogEntry) -> TelemetryResult<()> {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry.clone());
        }
        Ok(())
    }

    async fn tail(&self, limit: usize) -> TelemetryResult<Vec<CompletionLogEntry>> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn temp_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("completion-audit-{}", Uuid::new_v4()));
        path.push("audit.ndjson");
        path
    }

    fn entry(prompt: &str) -> CompletionLogEntry {
        CompletionLogEntry::new(
            CompletionKind::Response,
            json!({ "attempt": 1 }),
            prompt,
            Some("{}".to_owned()),
        )
    }

    #[tokio::test]
    async fn file_log_appends_and_tails() {
        let path = temp_path();
        let log = FileCompletionLog::open(&path).await.unwrap();

        for prompt in ["one", "two", "three"] {
            log.record(&entry(prompt)).await.unwrap();
        }

        let tail = log.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].prompt, "two");
        assert_eq!(tail[1].prompt, "three");
        assert!(log.tail(0).await.unwrap().is_empty());

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn reopening_appends_to_existing_entries() {
        let path = temp_path();
        FileCompletionLog::open(&path)
            .await
            .unwrap()
            .record(&entry("first"))
            .await
            .unwrap();
        let log = FileCompletionLog::open(&path).await.unwrap();
        log.record(&entry("second")).await.unwrap();

        assert_eq!(log.tail(10).await.unwrap().len(), 2);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn collecting_log_keeps_entries() {
        let log = CollectingCompletionLog::new();
        log.record(&entry("a")).await.unwrap();
        log.record(&entry("b")).await.unwrap();
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.tail(1).await.unwrap()[0].prompt, "b");
    }

    #[tokio::test]
    async fn tracing_log_never_fails() {
        let log = TracingCompletionLog;
        let timeout = CompletionLogEntry::new(CompletionKind::NameList, Value::Null, "p", None);
        log.record(&timeout).await.unwrap();
        assert!(log.tail(5).await.unwrap().is_empty());
    }
}
