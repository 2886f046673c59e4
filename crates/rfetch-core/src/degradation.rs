//! Session health tracking: success rate, consecutive failures, degraded flag.
//!
//! One tracker per fetch session. Every attempt is observed exactly once.
//! The degraded flag is sticky for the life of the session so downstream
//! reports can disclose that degradation happened at some point, even if
//! later attempts recovered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::config::DegradationConfig;

/// Result of one attempt as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Success,
    Failure,
}

/// Condition that flipped (or re-confirmed) degraded mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegradationTrigger {
    SuccessRate { rate: f64, threshold: f64 },
    ConsecutiveFailures { count: u32, limit: u32 },
}

impl fmt::Display for DegradationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradationTrigger::SuccessRate { rate, threshold } => write!(
                f,
                "success rate {:.0}% fell below the {:.0}% threshold; results may be partial",
                rate * 100.0,
                threshold * 100.0
            ),
            DegradationTrigger::ConsecutiveFailures { count, limit } => write!(
                f,
                "{} consecutive failed attempts (limit {}); results may be partial",
                count, limit
            ),
        }
    }
}

/// Read-only snapshot of session health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationStatus {
    pub consecutive_failures: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    /// `total_successes / total_attempts`, 1.0 before any attempt.
    pub success_rate: f64,
    pub is_degraded: bool,
    /// Logical operations that still produced a usable result.
    pub collected_results: u32,
    /// Human-readable warnings, at most one per trigger condition.
    pub warnings: Vec<String>,
}

impl Default for DegradationStatus {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            total_attempts: 0,
            total_successes: 0,
            total_failures: 0,
            success_rate: 1.0,
            is_degraded: false,
            collected_results: 0,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    status: DegradationStatus,
    rate_tripped: bool,
    streak_tripped: bool,
}

/// Rolling success/failure counter with a monotonic degraded flag.
///
/// `observe` and `status` share one lock, so a snapshot never shows a
/// counter update without the matching degraded recomputation.
#[derive(Debug)]
pub struct DegradationTracker {
    cfg: DegradationConfig,
    state: Mutex<TrackerState>,
}

impl DegradationTracker {
    pub fn new(cfg: DegradationConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.cfg
    }

    /// Record one attempt. Returns the triggers that fired for the first
    /// time on this observation (empty when nothing new happened).
    pub fn observe(&self, observation: Observation) -> Vec<DegradationTrigger> {
        let mut state = self.lock();
        let s = &mut state.status;
        s.total_attempts = s.total_attempts.saturating_add(1);
        match observation {
            Observation::Success => {
                s.total_successes = s.total_successes.saturating_add(1);
                s.consecutive_failures = 0;
            }
            Observation::Failure => {
                s.total_failures = s.total_failures.saturating_add(1);
                s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            }
        }
        s.success_rate = f64::from(s.total_successes) / f64::from(s.total_attempts);

        let mut fired = Vec::new();
        let rate_breach = s.total_attempts >= self.cfg.min_sample_size.max(1)
            && s.success_rate < self.cfg.min_success_threshold;
        if rate_breach && !state.rate_tripped {
            state.rate_tripped = true;
            fired.push(DegradationTrigger::SuccessRate {
                rate: state.status.success_rate,
                threshold: self.cfg.min_success_threshold,
            });
        }
        let streak = state.status.consecutive_failures;
        if streak >= self.cfg.max_consecutive_failures && !state.streak_tripped {
            state.streak_tripped = true;
            fired.push(DegradationTrigger::ConsecutiveFailures {
                count: streak,
                limit: self.cfg.max_consecutive_failures,
            });
        }

        for trigger in &fired {
            tracing::warn!("entering degraded mode: {}", trigger);
            state.status.is_degraded = true;
            state.status.warnings.push(trigger.to_string());
        }
        fired
    }

    /// Count a logical operation that produced a usable result.
    pub fn record_collected(&self) {
        let mut state = self.lock();
        state.status.collected_results = state.status.collected_results.saturating_add(1);
    }

    pub fn status(&self) -> DegradationStatus {
        self.lock().status.clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.lock().status.is_degraded
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
