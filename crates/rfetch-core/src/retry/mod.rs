//! Resilient fetch engine.
//!
//! Classification of attempt outcomes into block kinds, the per-attempt
//! retry/backoff policy, and the loop that drives a caller-owned fetch
//! primitive through them. Higher layers (session, CLI) share one policy
//! and one fetcher per session.

mod classify;
mod error;
mod outcome;
mod policy;
mod run;

pub use classify::{FailureClassifier, DEFAULT_CAPTCHA_PATTERNS, DEFAULT_PERMANENT_STATUSES};
pub use error::{Exhaustion, TerminalFailure};
pub use outcome::{AttemptError, AttemptOutcome, BlockKind, SAMPLE_LIMIT};
pub use policy::{RetryDecision, RetryPolicy, StopCause, Strategy};
pub use run::ResilientFetcher;
