use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::identity;
use crate::retry::{DEFAULT_CAPTCHA_PATTERNS, DEFAULT_PERMANENT_STATUSES};

/// Invalid configuration, reported at construction time before any network activity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("identity pool cannot be empty")]
    EmptyIdentityPool,
    #[error("identity at index {0} is blank")]
    BlankIdentity(usize),
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("max_consecutive_failures must be at least 1")]
    ZeroConsecutiveFailures,
    #[error("min_success_threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("{name} must be a non-negative number of seconds that fits a Duration, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },
    #[error("{name}: minimum exceeds maximum")]
    InvertedRange { name: &'static str },
    #[error("pacing probability must be within [0, 1], got {0}")]
    ProbabilityOutOfRange(f64),
    #[error("invalid CAPTCHA pattern: {0}")]
    InvalidPattern(String),
}

/// Retry policy parameters (`[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical operation (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub initial_delay_secs: f64,
    /// Maximum backoff delay in seconds (before jitter).
    pub max_delay_secs: f64,
    /// Fixed delay in seconds used after timeouts.
    pub linear_delay_secs: f64,
    /// Uniform jitter range in seconds added to every backoff.
    pub jitter_min_secs: f64,
    pub jitter_max_secs: f64,
    /// Ceiling on total backoff wait across one session.
    pub session_wait_ceiling_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 1.0,
            max_delay_secs: 60.0,
            linear_delay_secs: 2.0,
            jitter_min_secs: 0.0,
            jitter_max_secs: 1.0,
            session_wait_ceiling_secs: 1800.0,
        }
    }
}

/// Session health thresholds (`[degradation]` section).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Success rate below which the session is flagged degraded.
    pub min_success_threshold: f64,
    /// Consecutive failed attempts that flag the session degraded.
    pub max_consecutive_failures: u32,
    /// Attempts required before the success-rate check applies.
    pub min_sample_size: u32,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            min_success_threshold: 0.6,
            max_consecutive_failures: 3,
            min_sample_size: 1,
        }
    }
}

impl DegradationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_success_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.min_success_threshold));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroConsecutiveFailures);
        }
        Ok(())
    }
}

/// Randomized delay between independent logical operations (`[pacing]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Chance that a pause is applied at all before an operation.
    pub probability: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 1.0,
            max_delay_secs: 3.0,
            probability: 0.8,
        }
    }
}

/// Global configuration loaded from `~/.config/rfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfetchConfig {
    /// User-agent strings rotated across attempts.
    #[serde(default = "identity::default_identities")]
    pub identities: Vec<String>,
    /// Case-insensitive regexes that mark a CAPTCHA / bot-check page.
    #[serde(default = "default_captcha_patterns")]
    pub captcha_patterns: Vec<String>,
    /// HTTP statuses treated as permanent (never retried).
    #[serde(default = "default_permanent_statuses")]
    pub permanent_statuses: Vec<u16>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Search URL with a `{query}` placeholder, used by `rfetch search`.
    #[serde(default = "default_search_url_template")]
    pub search_url_template: String,
    /// Directory for per-session retry logs; XDG state dir when unset.
    #[serde(default)]
    pub telemetry_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub degradation: DegradationConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl Default for RfetchConfig {
    fn default() -> Self {
        Self {
            identities: identity::default_identities(),
            captcha_patterns: default_captcha_patterns(),
            permanent_statuses: default_permanent_statuses(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            search_url_template: default_search_url_template(),
            telemetry_dir: None,
            retry: RetryConfig::default(),
            degradation: DegradationConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

fn default_captcha_patterns() -> Vec<String> {
    DEFAULT_CAPTCHA_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_permanent_statuses() -> Vec<u16> {
    DEFAULT_PERMANENT_STATUSES.to_vec()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_search_url_template() -> String {
    "https://news.google.com/rss/search?q={query}&hl=en-US&gl=US&ceid=US:en".to_string()
}

impl RfetchConfig {
    /// Serialize as the on-disk TOML form.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Policy parameters for the retry engine, validated.
    pub fn policy(&self) -> Result<FetchPolicyConfig, ConfigError> {
        let r = &self.retry;
        let cfg = FetchPolicyConfig {
            max_attempts: r.max_attempts,
            initial_delay: secs("initial_delay_secs", r.initial_delay_secs)?,
            max_delay: secs("max_delay_secs", r.max_delay_secs)?,
            linear_delay: secs("linear_delay_secs", r.linear_delay_secs)?,
            jitter_min: secs("jitter_min_secs", r.jitter_min_secs)?,
            jitter_max: secs("jitter_max_secs", r.jitter_max_secs)?,
            session_wait_ceiling: secs("session_wait_ceiling_secs", r.session_wait_ceiling_secs)?,
            degradation: self.degradation,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// The policy configuration handed to the retry engine.
///
/// All knobs are explicit; nothing in the engine hard-codes a delay or limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchPolicyConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub linear_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub session_wait_ceiling: Duration,
    pub degradation: DegradationConfig,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            linear_delay: Duration::from_secs(2),
            jitter_min: Duration::ZERO,
            jitter_max: Duration::from_secs(1),
            session_wait_ceiling: Duration::from_secs(30 * 60),
            degradation: DegradationConfig::default(),
        }
    }
}

impl FetchPolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.jitter_min > self.jitter_max {
            return Err(ConfigError::InvertedRange { name: "jitter" });
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::InvertedRange { name: "initial_delay/max_delay" });
        }
        self.degradation.validate()
    }
}

pub(crate) fn secs(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::InvalidDuration { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { name, value })
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default directory for per-session retry logs: `~/.local/state/rfetch/retry_logs`.
pub fn default_telemetry_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rfetch")?;
    Ok(xdg_dirs.get_state_home().join("retry_logs"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RfetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RfetchConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RfetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
