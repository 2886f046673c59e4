//! Append-only structured log of one fetch session.
//!
//! Events are kept in memory in insertion order and written as a single JSON
//! document (`<dir>/<session_id>_retry_log.json`) on `flush`. A failure to
//! persist is reported to the caller of `flush` but never interrupts
//! `record`, so a broken disk cannot abort a fetch session.

mod event;
mod summary;

pub use event::{EventOutcome, FailureReason, FetchContext, RetryEvent};
pub use summary::{summarize, SessionSummary};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Degradation note carried in the session document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationInfo {
    pub is_degraded: bool,
    pub degradation_timestamp: Option<String>,
    pub degradation_reason: Option<String>,
}

/// The persisted session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub session_id: String,
    pub events: Vec<RetryEvent>,
    #[serde(default)]
    pub degradation_info: DegradationInfo,
}

impl SessionLog {
    pub fn summary(&self) -> SessionSummary {
        summarize(&self.events)
    }
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<RetryEvent>,
    last_stamp: Option<DateTime<Utc>>,
    degradation: DegradationInfo,
}

impl Inner {
    /// Current time, never earlier than the previous stamp.
    fn stamp(&mut self) -> String {
        let now = Utc::now();
        let at = match self.last_stamp {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_stamp = Some(at);
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Session-scoped event log. Safe to share between concurrent fetchers.
#[derive(Debug)]
pub struct SessionTelemetry {
    session_id: String,
    log_path: Option<PathBuf>,
    autoflush: bool,
    inner: Mutex<Inner>,
    // Serializes flushes so the file always ends up with the latest snapshot.
    flush_lock: Mutex<()>,
}

impl SessionTelemetry {
    /// Telemetry that will be written under `dir` on flush.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let (session_id, log_path) = claim_session_id(dir.as_ref(), new_session_id());
        Self::build(session_id, Some(log_path))
    }

    /// Telemetry with no durable target; `flush` is a no-op.
    pub fn in_memory() -> Self {
        Self::build(new_session_id(), None)
    }

    /// Re-write the log after every record.
    pub fn with_autoflush(mut self, autoflush: bool) -> Self {
        self.autoflush = autoflush;
        self
    }

    fn build(session_id: String, log_path: Option<PathBuf>) -> Self {
        Self {
            session_id,
            log_path,
            autoflush: false,
            inner: Mutex::new(Inner::default()),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Append an event, stamping `timestamp_utc` at record time.
    pub fn record(&self, mut event: RetryEvent) {
        {
            let mut inner = self.lock();
            event.timestamp_utc = inner.stamp();
            tracing::trace!(
                key = %event.context.logical_key,
                attempt = event.attempt_number,
                outcome = ?event.outcome,
                "telemetry event"
            );
            inner.events.push(event);
        }
        self.autoflush();
    }

    /// Note that the session entered degraded mode. The first reason wins.
    pub fn record_degradation(&self, reason: &str) {
        {
            let mut inner = self.lock();
            if inner.degradation.is_degraded {
                return;
            }
            let at = inner.stamp();
            inner.degradation = DegradationInfo {
                is_degraded: true,
                degradation_timestamp: Some(at),
                degradation_reason: Some(reason.to_string()),
            };
        }
        self.autoflush();
    }

    /// Snapshot of the events in insertion order.
    pub fn events(&self) -> Vec<RetryEvent> {
        self.lock().events.clone()
    }

    pub fn degradation_info(&self) -> DegradationInfo {
        self.lock().degradation.clone()
    }

    pub fn summarize(&self) -> SessionSummary {
        summarize(&self.lock().events)
    }

    /// Snapshot of the whole session document.
    pub fn snapshot(&self) -> SessionLog {
        let inner = self.lock();
        SessionLog {
            session_id: self.session_id.clone(),
            events: inner.events.clone(),
            degradation_info: inner.degradation.clone(),
        }
    }

    /// Write the session document, replacing any previous version atomically.
    /// Returns the written path, or `None` for in-memory telemetry.
    pub fn flush(&self) -> Result<Option<PathBuf>> {
        let Some(path) = self.log_path.as_deref() else {
            return Ok(None);
        };
        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());
        let json = serde_json::to_string_pretty(&self.snapshot()).context("serialize session log")?;
        write_atomic(path, json.as_bytes())?;
        Ok(Some(path.to_path_buf()))
    }

    /// Read a flushed session document.
    pub fn load(path: &Path) -> Result<SessionLog> {
        let bytes = std::fs::read(path).with_context(|| format!("read session log: {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse session log: {}", path.display()))
    }

    fn autoflush(&self) {
        if !self.autoflush {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!("failed to persist session log: {:#}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn new_session_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Log paths handed out by this process, including ones not yet flushed.
static CLAIMED_LOG_PATHS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Pick a session id whose log file is neither on disk nor claimed by
/// another session in this process. Sessions started within the same
/// second get `_2`, `_3`, ... appended.
fn claim_session_id(dir: &Path, base: String) -> (String, PathBuf) {
    let mut claimed = CLAIMED_LOG_PATHS.lock().unwrap_or_else(|e| e.into_inner());
    let mut session_id = base.clone();
    let mut n = 1u32;
    loop {
        let path = dir.join(format!("{}_retry_log.json", session_id));
        if !path.exists() && !claimed.contains(&path) {
            claimed.push(path.clone());
            return (session_id, path);
        }
        n += 1;
        session_id = format!("{}_{}", base, n);
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("write session log")?;
    tmp.as_file().sync_all().context("sync session log")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("replace session log: {}", path.display()))?;
    Ok(())
}
