//! Persisted telemetry records.

use serde::{Deserialize, Serialize};

use crate::retry::BlockKind;

/// Labels one logical operation in telemetry. Never used for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    pub target_url: String,
    pub logical_key: String,
}

impl FetchContext {
    pub fn new(target_url: impl Into<String>, logical_key: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            logical_key: logical_key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    RetryScheduled,
    Success,
    PermanentFailure,
}

/// Why an operation ended without a payload. Only set on `permanent_failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    CaptchaRequired,
    Permanent,
    Exhausted,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::CaptchaRequired => "captcha_required",
            FailureReason::Permanent => "permanent",
            FailureReason::Exhausted => "exhausted",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// One attempt as written to the session log. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEvent {
    /// RFC 3339, stamped by `SessionTelemetry::record`.
    #[serde(default)]
    pub timestamp_utc: String,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub block_kind: BlockKind,
    pub wait_duration_seconds: f64,
    /// Wait spent on this logical operation so far, including this event's wait.
    pub cumulative_wait_seconds: f64,
    pub identity_rotated: bool,
    pub outcome: EventOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Identity used for this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: FetchContext,
}

impl RetryEvent {
    /// Event with no wait, no rotation and no optional detail; callers fill
    /// in the rest with struct update syntax.
    pub fn new(
        context: &FetchContext,
        attempt_number: u32,
        max_attempts: u32,
        block_kind: BlockKind,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            timestamp_utc: String::new(),
            attempt_number,
            max_attempts,
            block_kind,
            wait_duration_seconds: 0.0,
            cumulative_wait_seconds: 0.0,
            identity_rotated: false,
            outcome,
            failure_reason: None,
            identity: None,
            status_code: None,
            error: None,
            context: context.clone(),
        }
    }
}
