//! Classify attempt outcomes (status, transport error, body sample) into block kinds.

use regex::{RegexSet, RegexSetBuilder};

use crate::config::ConfigError;
use crate::retry::outcome::{AttemptError, AttemptOutcome, BlockKind};

/// Body patterns that indicate a CAPTCHA or bot-check page.
pub const DEFAULT_CAPTCHA_PATTERNS: &[&str] = &[
    r"captcha",
    r"recaptcha",
    r"g-recaptcha",
    r"bot.*detection",
    r"verify.*human",
    r"please.*verify",
];

/// Statuses that will not change on retry.
pub const DEFAULT_PERMANENT_STATUSES: &[u16] = &[404, 410];

/// Pure classifier over `AttemptOutcome`s.
///
/// Precedence: body pattern, then status code, then transport error.
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    captcha: RegexSet,
    permanent_statuses: Vec<u16>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTCHA_PATTERNS, DEFAULT_PERMANENT_STATUSES)
            .unwrap_or_else(|_| unreachable!("built-in CAPTCHA patterns compile"))
    }
}

impl FailureClassifier {
    /// Build a classifier from case-insensitive CAPTCHA patterns and the set
    /// of permanent-failure statuses.
    pub fn new<S: AsRef<str>>(patterns: &[S], permanent_statuses: &[u16]) -> Result<Self, ConfigError> {
        let captcha = RegexSetBuilder::new(patterns.iter().map(|p| p.as_ref()))
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            captcha,
            permanent_statuses: permanent_statuses.to_vec(),
        })
    }

    /// True when the sample looks like a CAPTCHA / bot-check page.
    pub fn is_captcha(&self, sample: &str) -> bool {
        self.captcha.is_match(sample)
    }

    /// Assign a block kind to one attempt. First matching rule wins.
    pub fn classify<P>(&self, outcome: &AttemptOutcome<P>) -> BlockKind {
        if let Some(sample) = outcome.payload_sample.as_deref() {
            if self.is_captcha(sample) {
                return BlockKind::CaptchaChallenge;
            }
        }

        if let Some(code) = outcome.status_code {
            if let Some(kind) = self.classify_http_status(code) {
                return kind;
            }
        }

        match &outcome.error {
            Some(AttemptError::Timeout) => return BlockKind::Timeout,
            Some(AttemptError::Connection(_)) => return BlockKind::ConnectionFailure,
            Some(AttemptError::Other(_)) | None => {}
        }

        if outcome.succeeded() {
            BlockKind::NoBlock
        } else {
            // Covers both "no status, no error" (empty/unparseable payload)
            // and failed outcomes no earlier rule recognised.
            BlockKind::MalformedResponse
        }
    }

    /// Classify an HTTP status on its own. `None` for statuses that carry no
    /// block signal (2xx, 3xx, unlisted 4xx).
    pub fn classify_http_status(&self, code: u16) -> Option<BlockKind> {
        if self.permanent_statuses.contains(&code) {
            return Some(BlockKind::PermanentNotFound);
        }
        match code {
            429 => Some(BlockKind::RateLimited),
            403 => Some(BlockKind::Forbidden),
            500..=599 => Some(BlockKind::ServerError),
            _ => None,
        }
    }
}
