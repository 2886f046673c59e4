//! Cancellation for fetch sessions: shared cancel tokens with optional deadlines.
//!
//! Every suspension point in the engine (retry backoff, inter-operation
//! pacing, a running attempt) is raced against a `CancelToken`. A front end
//! (e.g. Ctrl-C in the CLI) cancels through `JobControl`, and the retry loop
//! abandons the wait promptly instead of finishing the sleep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Returned when a wait was cut short by cancellation or the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "interrupted by cancellation or deadline")
    }
}

impl std::error::Error for Interrupted {}

#[derive(Debug, Default)]
struct Shared {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation signal with an optional deadline.
///
/// Clones share the cancel flag; the deadline is per clone so a caller can
/// narrow it for one operation without affecting the others.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same cancel flag, with a deadline at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            shared: Arc::clone(&self.shared),
            deadline: Some(deadline),
        }
    }

    /// Same cancel flag, with a deadline `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Signal cancellation to every clone and wake all waiters.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        loop {
            // Register interest before checking the flag so a concurrent
            // `cancel()` between the check and the await is not lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => return,
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Sleep for `duration` unless the token fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancelToken) -> Result<(), Interrupted> {
    if cancel.is_cancelled() {
        return Err(Interrupted);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(Interrupted),
    }
}

/// Shared registry of logical key -> cancel token. Used by a front end to
/// cancel one operation or the whole session.
#[derive(Default)]
pub struct JobControl {
    session: CancelToken,
    jobs: RwLock<HashMap<String, CancelToken>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that is cancelled by `cancel_all`.
    pub fn session_token(&self) -> CancelToken {
        self.session.clone()
    }

    /// Register a running operation; returns its token. Cancelling the
    /// session also cancels it.
    pub fn register(&self, key: &str) -> CancelToken {
        let token = CancelToken::new();
        if self.session.is_cancelled() {
            token.cancel();
        }
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), token.clone());
        token
    }

    /// Unregister an operation (call when it finishes, success or failure).
    pub fn unregister(&self, key: &str) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Cancel a single registered operation. Returns false if unknown.
    pub fn request_cancel(&self, key: &str) -> bool {
        match self.jobs.read().unwrap_or_else(|e| e.into_inner()).get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the session and every registered operation.
    pub fn cancel_all(&self) {
        self.session.cancel();
        for token in self.jobs.read().unwrap_or_else(|e| e.into_inner()).values() {
            token.cancel();
        }
    }
}
