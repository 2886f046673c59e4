//! Randomized pause between independent logical operations.
//!
//! Separate from retry backoff: applied even when every fetch succeeds, so a
//! session never issues requests at a uniform cadence.

use rand::Rng;
use std::time::Duration;

use crate::config::{secs, ConfigError, PacingConfig};
use crate::control::{sleep_or_cancel, CancelToken, Interrupted};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacer {
    min_delay: Duration,
    max_delay: Duration,
    probability: f64,
}

impl Pacer {
    pub fn from_config(cfg: &PacingConfig) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&cfg.probability) {
            return Err(ConfigError::ProbabilityOutOfRange(cfg.probability));
        }
        let min_delay = secs("pacing.min_delay_secs", cfg.min_delay_secs)?;
        let max_delay = secs("pacing.max_delay_secs", cfg.max_delay_secs)?;
        if min_delay > max_delay {
            return Err(ConfigError::InvertedRange { name: "pacing" });
        }
        Ok(Self {
            min_delay,
            max_delay,
            probability: cfg.probability,
        })
    }

    /// A pacer that never pauses.
    pub fn disabled() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            probability: 0.0,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.probability <= 0.0 || self.max_delay.is_zero()
    }

    /// Decide the next pause: `None` when this operation goes out unpaced.
    pub fn draw_delay(&self) -> Option<Duration> {
        self.draw_delay_with_rng(&mut rand::thread_rng())
    }

    pub fn draw_delay_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Duration> {
        if self.is_disabled() || !rng.gen_bool(self.probability) {
            return None;
        }
        if self.min_delay == self.max_delay {
            return Some(self.min_delay);
        }
        let secs = rng.gen_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Some(Duration::from_secs_f64(secs))
    }

    /// Sleep for a drawn delay unless cancelled. Returns the time waited.
    pub async fn pause(&self, cancel: &CancelToken) -> Result<Duration, Interrupted> {
        match self.draw_delay() {
            Some(delay) => {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing before next operation");
                sleep_or_cancel(delay, cancel).await?;
                Ok(delay)
            }
            None if cancel.is_cancelled() => Err(Interrupted),
            None => Ok(Duration::ZERO),
        }
    }
}
