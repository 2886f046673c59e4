//! Block kinds and the per-attempt outcome fed to the classifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound (bytes) on the payload sample kept for pattern matching.
pub const SAMPLE_LIMIT: usize = 4096;

/// Why an attempt failed or was rejected by the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// HTTP 429.
    RateLimited,
    /// HTTP 403; the current identity is suspect.
    Forbidden,
    /// A CAPTCHA / bot-check page was served.
    CaptchaChallenge,
    /// The attempt exceeded its deadline.
    Timeout,
    /// Connect, DNS or socket-level failure.
    ConnectionFailure,
    /// HTTP 5xx.
    ServerError,
    /// Empty, unparseable or otherwise unusable response.
    MalformedResponse,
    /// HTTP 404 / 410 (or another configured permanent status).
    PermanentNotFound,
    /// The attempt succeeded.
    NoBlock,
}

impl BlockKind {
    /// Whether another attempt may help. `NoBlock` is not a failure and is
    /// reported as not retryable.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            BlockKind::CaptchaChallenge | BlockKind::PermanentNotFound | BlockKind::NoBlock
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::RateLimited => "rate_limited",
            BlockKind::Forbidden => "forbidden",
            BlockKind::CaptchaChallenge => "captcha_challenge",
            BlockKind::Timeout => "timeout",
            BlockKind::ConnectionFailure => "connection_failure",
            BlockKind::ServerError => "server_error",
            BlockKind::MalformedResponse => "malformed_response",
            BlockKind::PermanentNotFound => "permanent_not_found",
            BlockKind::NoBlock => "no_block",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure of an attempt (no usable HTTP response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// The request ran past its deadline.
    Timeout,
    /// Could not connect, resolve, send or receive.
    Connection(String),
    /// Anything else the transport reported.
    Other(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Timeout => write!(f, "timed out"),
            AttemptError::Connection(msg) => write!(f, "connection failure: {}", msg),
            AttemptError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Result of one fetch attempt as seen by the retry engine.
///
/// An outcome is successful exactly when it carries a payload. The sample is
/// a bounded prefix of the response body used only for block detection.
#[derive(Debug, Clone)]
pub struct AttemptOutcome<P> {
    pub payload: Option<P>,
    pub status_code: Option<u16>,
    pub error: Option<AttemptError>,
    pub payload_sample: Option<String>,
}

impl<P> AttemptOutcome<P> {
    /// A usable response. `sample` is the body text the classifier may scan.
    pub fn success(payload: P, sample: Option<&str>) -> Self {
        Self {
            payload: Some(payload),
            status_code: None,
            error: None,
            payload_sample: sample.map(bounded_sample),
        }
    }

    /// A response whose status means the payload cannot be used.
    pub fn http_status(code: u16, sample: Option<&str>) -> Self {
        Self {
            payload: None,
            status_code: Some(code),
            error: None,
            payload_sample: sample.map(bounded_sample),
        }
    }

    /// No response at all.
    pub fn failed(error: AttemptError) -> Self {
        Self {
            payload: None,
            status_code: None,
            error: Some(error),
            payload_sample: None,
        }
    }

    /// A response arrived but could not be used (empty or unparseable body).
    pub fn malformed(sample: Option<&str>) -> Self {
        Self {
            payload: None,
            status_code: None,
            error: None,
            payload_sample: sample.map(bounded_sample),
        }
    }

    /// Attach the HTTP status of an otherwise successful response.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.payload.is_some()
    }

    /// Short human-readable description of a failed attempt, for telemetry.
    pub fn describe_failure(&self) -> Option<String> {
        if let Some(err) = &self.error {
            return Some(err.to_string());
        }
        match (self.succeeded(), self.status_code) {
            (false, Some(code)) => Some(format!("HTTP {}", code)),
            (false, None) => Some("empty or unparseable response".to_string()),
            (true, _) => None,
        }
    }
}

/// Truncate to at most `SAMPLE_LIMIT` bytes without splitting a character.
fn bounded_sample(text: &str) -> String {
    if text.len() <= SAMPLE_LIMIT {
        return text.to_string();
    }
    let mut end = SAMPLE_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
