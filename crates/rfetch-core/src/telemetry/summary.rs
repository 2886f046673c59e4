//! Aggregate statistics derived from a session's events.

use serde::{Deserialize, Serialize};

use super::event::{EventOutcome, RetryEvent};

/// Derived view over a session's events; recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Number of recorded events (one per attempt).
    pub total_attempts: usize,
    /// Logical operations that ended with a payload.
    pub success_count: usize,
    /// Logical operations that ended without one.
    pub failure_count: usize,
    /// Attempts that were followed by a scheduled retry.
    pub retry_count: usize,
    /// `success / (success + failure)`; 1.0 before any operation finished.
    pub success_rate: f64,
    /// Mean wait over scheduled retries; 0.0 when there were none.
    pub average_wait_seconds: f64,
    pub total_wait_seconds: f64,
}

pub fn summarize(events: &[RetryEvent]) -> SessionSummary {
    let mut success_count = 0;
    let mut failure_count = 0;
    let mut retry_count = 0;
    let mut total_wait = 0.0;
    for ev in events {
        match ev.outcome {
            EventOutcome::Success => success_count += 1,
            EventOutcome::PermanentFailure => failure_count += 1,
            EventOutcome::RetryScheduled => {
                retry_count += 1;
                total_wait += ev.wait_duration_seconds;
            }
        }
    }
    let finished = success_count + failure_count;
    let success_rate = if finished == 0 {
        1.0
    } else {
        success_count as f64 / finished as f64
    };
    let average_wait_seconds = if retry_count == 0 {
        0.0
    } else {
        total_wait / retry_count as f64
    };
    SessionSummary {
        total_attempts: events.len(),
        success_count,
        failure_count,
        retry_count,
        success_rate,
        average_wait_seconds,
        total_wait_seconds: total_wait,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BlockKind;
    use crate::telemetry::event::FetchContext;

    fn ev(outcome: EventOutcome, wait: f64) -> RetryEvent {
        let ctx = FetchContext::new("u", "k");
        RetryEvent {
            wait_duration_seconds: wait,
            ..RetryEvent::new(&ctx, 1, 5, BlockKind::RateLimited, outcome)
        }
    }

    #[test]
    fn empty_session() {
        let s = summarize(&[]);
        assert_eq!(s.total_attempts, 0);
        assert_eq!(s.success_rate, 1.0);
        assert_eq!(s.average_wait_seconds, 0.0);
    }

    #[test]
    fn counts_operations_and_waits() {
        let events = vec![
            ev(EventOutcome::RetryScheduled, 1.0),
            ev(EventOutcome::RetryScheduled, 3.0),
            ev(EventOutcome::Success, 0.0),
            ev(EventOutcome::PermanentFailure, 0.0),
            ev(EventOutcome::Success, 0.0),
            ev(EventOutcome::Success, 0.0),
        ];
        let s = summarize(&events);
        assert_eq!(s.total_attempts, 6);
        assert_eq!(s.success_count, 3);
        assert_eq!(s.failure_count, 1);
        assert_eq!(s.retry_count, 2);
        assert!((s.success_rate - 0.75).abs() < 1e-9);
        assert!((s.average_wait_seconds - 2.0).abs() < 1e-9);
        assert!((s.total_wait_seconds - 4.0).abs() < 1e-9);
    }
}
