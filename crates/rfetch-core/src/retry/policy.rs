//! Per-attempt retry decisions and backoff computation.

use rand::Rng;
use std::time::Duration;

use crate::config::FetchPolicyConfig;
use crate::retry::outcome::BlockKind;

/// Backoff strategy applied to a retryable block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `initial_delay * 2^(attempt-1)`, capped at `max_delay`.
    Exponential,
    /// Fixed `linear_delay` before every retry.
    Linear,
}

impl Strategy {
    pub fn for_kind(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Timeout => Strategy::Linear,
            _ => Strategy::Exponential,
        }
    }
}

/// Why a decision stops the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Success,
    CaptchaRequired,
    Permanent,
    AttemptsExhausted,
    WaitCeiling,
}

/// Decision returned by the retry policy for one classified attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Delay before the next attempt (zero when not retrying).
    pub wait: Duration,
    /// Rotate to the next identity before the next attempt.
    pub rotate_identity: bool,
    pub reason: BlockKind,
    /// Set exactly when `should_retry` is false.
    pub stop: Option<StopCause>,
}

impl RetryDecision {
    fn stop(reason: BlockKind, cause: StopCause) -> Self {
        Self {
            should_retry: false,
            wait: Duration::ZERO,
            rotate_identity: false,
            reason,
            stop: Some(cause),
        }
    }

    fn retry_after(reason: BlockKind, wait: Duration) -> Self {
        Self {
            should_retry: true,
            wait,
            rotate_identity: matches!(reason, BlockKind::RateLimited | BlockKind::Forbidden),
            reason,
            stop: None,
        }
    }
}

/// Per-attempt retry decision engine.
///
/// Immutable once built; the only randomness is the jitter drawn per
/// decision.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub initial_delay: Duration,
    /// Upper bound on the backoff component.
    pub max_delay: Duration,
    /// Delay used by the linear strategy.
    pub linear_delay: Duration,
    /// Uniform jitter range added on top of every backoff.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Total wait allowed across the session.
    pub session_wait_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchPolicyConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &FetchPolicyConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            initial_delay: cfg.initial_delay,
            max_delay: cfg.max_delay,
            linear_delay: cfg.linear_delay,
            jitter_min: cfg.jitter_min,
            jitter_max: cfg.jitter_max,
            session_wait_ceiling: cfg.session_wait_ceiling,
        }
    }

    /// Decide what to do after attempt `attempt` (1-based) was classified as
    /// `kind`. `cumulative_wait` is the wait already spent in this session.
    pub fn decide(&self, kind: BlockKind, attempt: u32, cumulative_wait: Duration) -> RetryDecision {
        self.decide_with_rng(kind, attempt, cumulative_wait, &mut rand::thread_rng())
    }

    /// Same as [`decide`](Self::decide) with a caller-supplied jitter source.
    pub fn decide_with_rng<R: Rng + ?Sized>(
        &self,
        kind: BlockKind,
        attempt: u32,
        cumulative_wait: Duration,
        rng: &mut R,
    ) -> RetryDecision {
        match kind {
            BlockKind::NoBlock => return RetryDecision::stop(kind, StopCause::Success),
            BlockKind::CaptchaChallenge => return RetryDecision::stop(kind, StopCause::CaptchaRequired),
            BlockKind::PermanentNotFound => return RetryDecision::stop(kind, StopCause::Permanent),
            _ => {}
        }

        if attempt >= self.max_attempts {
            return RetryDecision::stop(kind, StopCause::AttemptsExhausted);
        }

        let wait = self.backoff(kind, attempt).saturating_add(self.jitter(rng));
        if cumulative_wait.saturating_add(wait) > self.session_wait_ceiling {
            return RetryDecision::stop(kind, StopCause::WaitCeiling);
        }

        RetryDecision::retry_after(kind, wait)
    }

    /// Jitter-free delay for a retryable kind after attempt `attempt`.
    pub fn backoff(&self, kind: BlockKind, attempt: u32) -> Duration {
        match Strategy::for_kind(kind) {
            Strategy::Linear => self.linear_delay,
            Strategy::Exponential => {
                // initial * 2^(attempt-1); the shift saturates instead of overflowing.
                let exp = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                self.initial_delay.saturating_mul(exp).min(self.max_delay)
            }
        }
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let secs = rng.gen_range(self.jitter_min.as_secs_f64()..=self.jitter_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
