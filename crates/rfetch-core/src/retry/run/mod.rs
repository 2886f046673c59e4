//! Retry loop: drive one logical operation to a payload or a terminal failure.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::classify::FailureClassifier;
use super::error::{Exhaustion, TerminalFailure};
use super::outcome::{AttemptOutcome, BlockKind};
use super::policy::{RetryDecision, RetryPolicy, StopCause};
use crate::control::{sleep_or_cancel, CancelToken};
use crate::degradation::{DegradationTracker, Observation};
use crate::identity::IdentityPool;
use crate::telemetry::{EventOutcome, FailureReason, FetchContext, RetryEvent, SessionTelemetry};

/// Wraps a caller-owned fetch primitive with classification, backoff,
/// identity rotation, telemetry and degradation tracking.
///
/// One fetcher per session. `execute` takes `&self`, so a caller may run
/// several operations concurrently against the same fetcher.
pub struct ResilientFetcher {
    policy: RetryPolicy,
    classifier: Arc<FailureClassifier>,
    identities: Arc<IdentityPool>,
    telemetry: Arc<SessionTelemetry>,
    tracker: Arc<DegradationTracker>,
    /// Wait scheduled across every operation run by this fetcher.
    session_wait: Mutex<Duration>,
}

impl ResilientFetcher {
    pub fn new(
        policy: RetryPolicy,
        classifier: Arc<FailureClassifier>,
        identities: Arc<IdentityPool>,
        telemetry: Arc<SessionTelemetry>,
        tracker: Arc<DegradationTracker>,
    ) -> Self {
        Self {
            policy,
            classifier,
            identities,
            telemetry,
            tracker,
            session_wait: Mutex::new(Duration::ZERO),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn identities(&self) -> &Arc<IdentityPool> {
        &self.identities
    }

    pub fn telemetry(&self) -> &Arc<SessionTelemetry> {
        &self.telemetry
    }

    pub fn tracker(&self) -> &Arc<DegradationTracker> {
        &self.tracker
    }

    /// Total backoff scheduled so far in this session.
    pub fn total_wait(&self) -> Duration {
        *self.wait_lock()
    }

    /// Run `op` until it yields a payload or the policy gives up.
    ///
    /// `op` receives the identity to use for each attempt. Every completed
    /// attempt produces one telemetry event and one degradation observation.
    /// Attempts and backoff waits are raced against `cancel`.
    pub async fn execute<P, F, Fut>(
        &self,
        ctx: &FetchContext,
        cancel: &CancelToken,
        mut op: F,
    ) -> Result<P, TerminalFailure>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = AttemptOutcome<P>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut identity = self.identities.current();
        let mut op_wait = Duration::ZERO;
        let mut last_kind: Option<BlockKind> = None;
        let mut completed = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(ctx, completed, last_kind, op_wait, &identity));
            }
            let attempt = completed + 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(self.cancelled(ctx, completed, last_kind, op_wait, &identity));
                }
                outcome = op(identity.clone()) => outcome,
            };
            completed = attempt;

            let kind = self.classifier.classify(&outcome);
            last_kind = Some(kind);
            let event = RetryEvent {
                identity: Some(identity.clone()),
                status_code: outcome.status_code,
                error: outcome.describe_failure(),
                cumulative_wait_seconds: op_wait.as_secs_f64(),
                ..RetryEvent::new(ctx, attempt, max_attempts, kind, EventOutcome::Success)
            };

            if kind == BlockKind::NoBlock {
                if let Some(payload) = outcome.payload {
                    tracing::debug!(key = %ctx.logical_key, attempt, "fetch succeeded");
                    self.telemetry.record(event);
                    self.observe(Observation::Success);
                    return Ok(payload);
                }
            }

            tracing::warn!(
                key = %ctx.logical_key,
                attempt,
                kind = %kind,
                "attempt blocked: {}",
                event.error.as_deref().unwrap_or("no detail")
            );

            let decision = self.reserve_wait(kind, attempt);
            if !decision.should_retry {
                let (failure, reason) = terminal(&decision, kind, attempt);
                tracing::error!(
                    key = %ctx.logical_key,
                    url = %ctx.target_url,
                    attempts = attempt,
                    kind = %kind,
                    "giving up: {}",
                    failure
                );
                self.telemetry.record(RetryEvent {
                    outcome: EventOutcome::PermanentFailure,
                    failure_reason: Some(reason),
                    ..event
                });
                self.observe(Observation::Failure);
                return Err(failure);
            }

            if decision.rotate_identity {
                identity = self.identities.next();
                tracing::debug!(key = %ctx.logical_key, "rotated identity after {}", kind);
            }
            op_wait += decision.wait;
            tracing::info!(
                key = %ctx.logical_key,
                attempt,
                max_attempts,
                wait_ms = decision.wait.as_millis() as u64,
                "retry scheduled after {}",
                kind
            );
            self.telemetry.record(RetryEvent {
                outcome: EventOutcome::RetryScheduled,
                wait_duration_seconds: decision.wait.as_secs_f64(),
                cumulative_wait_seconds: op_wait.as_secs_f64(),
                identity_rotated: decision.rotate_identity,
                ..event
            });
            self.observe(Observation::Failure);

            if sleep_or_cancel(decision.wait, cancel).await.is_err() {
                return Err(self.cancelled(ctx, completed, last_kind, op_wait, &identity));
            }
        }
    }

    /// Decide under the wait lock and reserve the wait, so concurrent
    /// operations cannot jointly overrun the session ceiling.
    fn reserve_wait(&self, kind: BlockKind, attempt: u32) -> RetryDecision {
        let mut total = self.wait_lock();
        let decision = self.policy.decide(kind, attempt, *total);
        if decision.should_retry {
            *total = total.saturating_add(decision.wait);
        }
        decision
    }

    fn observe(&self, observation: Observation) {
        for trigger in self.tracker.observe(observation) {
            self.telemetry.record_degradation(&trigger.to_string());
        }
    }

    fn cancelled(
        &self,
        ctx: &FetchContext,
        attempts_made: u32,
        last_kind: Option<BlockKind>,
        op_wait: Duration,
        identity: &str,
    ) -> TerminalFailure {
        tracing::warn!(key = %ctx.logical_key, attempts = attempts_made, "operation cancelled");
        // Nothing ran, so there is no attempt to report.
        if let Some(kind) = last_kind {
            self.telemetry.record(RetryEvent {
                failure_reason: Some(FailureReason::Cancelled),
                identity: Some(identity.to_string()),
                cumulative_wait_seconds: op_wait.as_secs_f64(),
                ..RetryEvent::new(
                    ctx,
                    attempts_made,
                    self.policy.max_attempts,
                    kind,
                    EventOutcome::PermanentFailure,
                )
            });
        }
        TerminalFailure::Cancelled {
            last_kind,
            attempts_made,
        }
    }

    fn wait_lock(&self) -> MutexGuard<'_, Duration> {
        self.session_wait.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn terminal(decision: &RetryDecision, kind: BlockKind, attempts_made: u32) -> (TerminalFailure, FailureReason) {
    match decision.stop {
        Some(StopCause::CaptchaRequired) => (
            TerminalFailure::NonRetryable { kind, attempts_made },
            FailureReason::CaptchaRequired,
        ),
        Some(StopCause::Permanent) => (
            TerminalFailure::NonRetryable { kind, attempts_made },
            FailureReason::Permanent,
        ),
        Some(StopCause::WaitCeiling) => (
            TerminalFailure::Exhausted {
                kind,
                attempts_made,
                cause: Exhaustion::WaitCeiling,
            },
            FailureReason::Exhausted,
        ),
        _ => (
            TerminalFailure::Exhausted {
                kind,
                attempts_made,
                cause: Exhaustion::Attempts,
            },
            FailureReason::Exhausted,
        ),
    }
}

#[cfg(test)]
mod tests;
