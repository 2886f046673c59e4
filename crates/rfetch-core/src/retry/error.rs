//! Terminal failure of one logical fetch operation.

use thiserror::Error;

use super::outcome::BlockKind;

/// Why a retryable kind still ended the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Every allowed attempt was used.
    Attempts,
    /// The next wait would have pushed the session past its wait ceiling.
    WaitCeiling,
}

/// The only error that crosses the `ResilientFetcher` boundary.
///
/// Individual attempt failures are absorbed by the retry loop; callers see
/// one of these once the operation cannot produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalFailure {
    /// CAPTCHA or permanent-not-found; retrying would not help.
    #[error("{kind} after {attempts_made} attempt(s); not retryable")]
    NonRetryable { kind: BlockKind, attempts_made: u32 },
    /// Retryable failures until the attempt budget or wait ceiling ran out.
    #[error("{kind} after {attempts_made} attempt(s); retries exhausted ({cause:?})")]
    Exhausted {
        kind: BlockKind,
        attempts_made: u32,
        cause: Exhaustion,
    },
    /// Caller cancelled or the session deadline passed.
    #[error("cancelled after {attempts_made} attempt(s)")]
    Cancelled {
        last_kind: Option<BlockKind>,
        attempts_made: u32,
    },
}

impl TerminalFailure {
    /// Block kind of the last completed attempt, if any.
    pub fn block_kind(&self) -> Option<BlockKind> {
        match self {
            TerminalFailure::NonRetryable { kind, .. } | TerminalFailure::Exhausted { kind, .. } => {
                Some(*kind)
            }
            TerminalFailure::Cancelled { last_kind, .. } => *last_kind,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        match self {
            TerminalFailure::NonRetryable { attempts_made, .. }
            | TerminalFailure::Exhausted { attempts_made, .. }
            | TerminalFailure::Cancelled { attempts_made, .. } => *attempts_made,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TerminalFailure::Cancelled { .. })
    }

    /// Short reason label used in telemetry and reports.
    pub fn reason(&self) -> &'static str {
        match self {
            TerminalFailure::NonRetryable {
                kind: BlockKind::CaptchaChallenge,
                ..
            } => "captcha_required",
            TerminalFailure::NonRetryable { .. } => "permanent",
            TerminalFailure::Exhausted { .. } => "exhausted",
            TerminalFailure::Cancelled { .. } => "cancelled",
        }
    }
}
