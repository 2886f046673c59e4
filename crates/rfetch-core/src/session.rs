//! One fetch session: the engine components wired from configuration, plus
//! inter-operation pacing and the bookkeeping downstream reports need.

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{ConfigError, RfetchConfig};
use crate::control::CancelToken;
use crate::degradation::{DegradationStatus, DegradationTracker};
use crate::identity::IdentityPool;
use crate::pacing::Pacer;
use crate::retry::{AttemptOutcome, BlockKind, FailureClassifier, ResilientFetcher, RetryPolicy, TerminalFailure};
use crate::telemetry::{FetchContext, SessionSummary, SessionTelemetry};

/// A logical operation left out of the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub logical_key: String,
    pub target_url: String,
    /// `captcha_required`, `permanent`, `exhausted` or `cancelled`.
    pub reason: &'static str,
    pub block_kind: Option<BlockKind>,
    pub attempts: u32,
}

/// What a finished session hands to the front end.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub summary: SessionSummary,
    pub status: DegradationStatus,
    pub skipped: Vec<SkippedItem>,
    /// Where telemetry was written; `None` if in-memory or the write failed.
    pub log_path: Option<PathBuf>,
}

impl SessionReport {
    /// Degradation warnings, plus a partial-results notice when any item
    /// was skipped.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = self.status.warnings.clone();
        if !self.skipped.is_empty() {
            let total = self.skipped.len() + self.status.collected_results as usize;
            out.push(format!(
                "{} of {} item(s) skipped; results are partial",
                self.skipped.len(),
                total
            ));
        }
        out
    }

    pub fn is_partial(&self) -> bool {
        self.status.is_degraded || !self.skipped.is_empty()
    }
}

pub struct FetchSession {
    fetcher: ResilientFetcher,
    pacer: Pacer,
    started: AtomicBool,
    skipped: Mutex<Vec<SkippedItem>>,
}

impl FetchSession {
    /// Validate `cfg` and build the session. All configuration errors surface
    /// here, before any network activity.
    pub fn new(cfg: &RfetchConfig, telemetry_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let policy_cfg = cfg.policy()?;
        let classifier = FailureClassifier::new(&cfg.captcha_patterns, &cfg.permanent_statuses)?;
        let identities = IdentityPool::new(cfg.identities.clone())?;
        let pacer = Pacer::from_config(&cfg.pacing)?;
        let telemetry = match telemetry_dir {
            Some(dir) => SessionTelemetry::new(dir),
            None => SessionTelemetry::in_memory(),
        };
        let fetcher = ResilientFetcher::new(
            RetryPolicy::from_config(&policy_cfg),
            Arc::new(classifier),
            Arc::new(identities),
            Arc::new(telemetry),
            Arc::new(DegradationTracker::new(policy_cfg.degradation)),
        );
        tracing::debug!(
            session = %fetcher.telemetry().session_id(),
            max_attempts = policy_cfg.max_attempts,
            "fetch session created"
        );
        Ok(Self::from_parts(fetcher, pacer))
    }

    pub fn from_parts(fetcher: ResilientFetcher, pacer: Pacer) -> Self {
        Self {
            fetcher,
            pacer,
            started: AtomicBool::new(false),
            skipped: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    pub fn session_id(&self) -> &str {
        self.fetcher.telemetry().session_id()
    }

    /// Run one logical operation. Every operation but the first is preceded
    /// by a randomized pause. Failures are recorded as skipped items.
    pub async fn fetch<P, F, Fut>(&self, ctx: &FetchContext, cancel: &CancelToken, op: F) -> Result<P, TerminalFailure>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = AttemptOutcome<P>>,
    {
        if self.started.swap(true, Ordering::SeqCst) && self.pacer.pause(cancel).await.is_err() {
            let failure = TerminalFailure::Cancelled {
                last_kind: None,
                attempts_made: 0,
            };
            self.skip(ctx, &failure);
            return Err(failure);
        }

        match self.fetcher.execute(ctx, cancel, op).await {
            Ok(payload) => {
                self.fetcher.tracker().record_collected();
                Ok(payload)
            }
            Err(failure) => {
                self.skip(ctx, &failure);
                Err(failure)
            }
        }
    }

    pub fn status(&self) -> DegradationStatus {
        self.fetcher.tracker().status()
    }

    pub fn summary(&self) -> SessionSummary {
        self.fetcher.telemetry().summarize()
    }

    pub fn skipped(&self) -> Vec<SkippedItem> {
        self.lock_skipped().clone()
    }

    /// Flush telemetry and produce the final report. A flush failure is
    /// logged and leaves `log_path` empty.
    pub fn finish(self) -> SessionReport {
        let telemetry = self.fetcher.telemetry();
        let log_path = match telemetry.flush() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("failed to write session log: {:#}", e);
                None
            }
        };
        let report = SessionReport {
            session_id: telemetry.session_id().to_string(),
            summary: telemetry.summarize(),
            status: self.fetcher.tracker().status(),
            skipped: self.skipped(),
            log_path,
        };
        tracing::info!(
            session = %report.session_id,
            collected = report.status.collected_results,
            skipped = report.skipped.len(),
            degraded = report.status.is_degraded,
            "fetch session finished"
        );
        report
    }

    fn skip(&self, ctx: &FetchContext, failure: &TerminalFailure) {
        self.lock_skipped().push(SkippedItem {
            logical_key: ctx.logical_key.clone(),
            target_url: ctx.target_url.clone(),
            reason: failure.reason(),
            block_kind: failure.block_kind(),
            attempts: failure.attempts_made(),
        });
    }

    fn lock_skipped(&self) -> MutexGuard<'_, Vec<SkippedItem>> {
        self.skipped.lock().unwrap_or_else(|e| e.into_inner())
    }
}
