use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an absent `config.toml` yields a usable
/// configuration as long as `DATABASE_URL` is available.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub analytics: AnalyticsSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Config {
    /// Rejects values that would make the pool, retry loop or validator misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.retry.validate()?;
        self.analytics.validate()?;
        Ok(())
    }
}

/// Connection pool settings for the PostgreSQL item store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection string. Falls back to the `DATABASE_URL` environment variable.
    pub url: Option<String>,
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long to wait for a free connection before giving up.
    pub acquire_timeout_secs: u64,
    /// Idle connections are closed after this long.
    pub idle_timeout_secs: u64,
    /// Connections are recycled after this long regardless of use.
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        }
    }
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError(format!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Bounded retry policy for transient storage failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the first retry.
    pub delay_ms: u64,
    /// Multiplier applied to the delay after every failed attempt.
    pub backoff: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 100,
            backoff: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff.is_finite() || self.backoff < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff must be a finite number >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tunables consumed by the analytics engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// The widest `[from, to]` window a query may cover.
    pub max_period_days: i64,
    /// Deadline for one analytics call. `0` disables the deadline.
    pub query_timeout_secs: u64,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            max_period_days: 365,
            query_timeout_secs: 30,
        }
    }
}

impl AnalyticsSettings {
    pub fn max_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_period_days)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // chrono::Duration::days panics beyond roughly 10^14 days.
        if !(1..=36_500).contains(&self.max_period_days) {
            return Err(ConfigError::ValidationError(format!(
                "analytics.max_period_days must be between 1 and 36500, got {}",
                self.max_period_days
            )));
        }
        Ok(())
    }
}

/// Output format of the console log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Logging setup for the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            directory: None,
        }
    }
}
