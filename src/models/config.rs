//! Operator configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

/// Longest accepted host cooldown (30 days).
pub const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 60 * 60;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Instance health tracking
    #[serde(default)]
    pub health: HealthConfig,

    /// Merge and page-size settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Retry policy for settings/state loading
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.health.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(AppError::validation(format!(
                "health.cooldown_secs must be <= {MAX_COOLDOWN_SECS}"
            )));
        }
        if self.aggregation.page_size == 0 {
            return Err(AppError::validation("aggregation.page_size must be > 0"));
        }
        if self.aggregation.per_host_count == 0 {
            return Err(AppError::validation(
                "aggregation.per_host_count must be > 0",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request time budget in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum hosts fetched at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Health cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// How long a failed host stays out of selection
    #[serde(default = "defaults::cooldown")]
    pub cooldown_secs: u64,
}

impl HealthConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::cooldown(),
        }
    }
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Maximum items in one aggregated page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// `count` sent to each host
    #[serde(default = "defaults::per_host_count")]
    pub per_host_count: usize,

    /// `sort` sent to each host
    #[serde(default = "defaults::sort")]
    pub sort: String,

    /// `nsfw` policy sent to each host (`true`, `false` or `both`)
    #[serde(default = "defaults::nsfw")]
    pub nsfw: String,

    /// Hosts added to the candidate list after the user's instances
    #[serde(default)]
    pub fallback_instances: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::page_size(),
            per_host_count: defaults::per_host_count(),
            sort: defaults::sort(),
            nsfw: defaults::nsfw(),
            fallback_instances: Vec::new(),
        }
    }
}

/// Bounded retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// Build the policy applied at the load boundary.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_backoff_ms: defaults::initial_backoff(),
            max_backoff_ms: defaults::max_backoff(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; fedtube/0.1)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        4
    }

    // Health defaults
    pub fn cooldown() -> u64 {
        600
    }

    // Aggregation defaults
    pub fn page_size() -> usize {
        20
    }
    pub fn per_host_count() -> usize {
        20
    }
    pub fn sort() -> String {
        "-publishedAt".into()
    }
    pub fn nsfw() -> String {
        "false".into()
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn initial_backoff() -> u64 {
        100
    }
    pub fn max_backoff() -> u64 {
        2_000
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
