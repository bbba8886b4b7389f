use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    AnalyticsSettings, Config, DatabaseSettings, LogFormat, LoggingSettings, RetrySettings,
};

/// Prefix of environment variables that override file values,
/// e.g. `APP__DATABASE__MAX_CONNECTIONS=20`.
pub const ENV_PREFIX: &str = "APP";

/// Loads the application configuration.
///
/// Values come from the TOML file at `path` (optional; missing files are skipped),
/// then from `APP__`-prefixed environment variables. The result is validated
/// before it is returned.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load(path, None)
}

fn load(path: &Path, env: Option<HashMap<String, String>>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load(Path::new("does-not-exist.toml"), Some(HashMap::new())).unwrap();
        assert_eq!(config.analytics.max_period_days, 365);
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
            [database]
            url = "postgres://localhost/ledger"
            max_connections = 4
            min_connections = 1

            [analytics]
            max_period_days = 31
            query_timeout_secs = 0
            "#,
        );
        let config = load(file.path(), Some(HashMap::new())).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/ledger"));
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.analytics.max_period(), chrono::Duration::days(31));
        assert!(config.analytics.query_timeout().is_none());
        // Untouched sections keep their defaults.
        assert_eq!(config.retry.delay_ms, 100);
    }

    #[test]
    fn environment_overrides_file() {
        let file = write_config("[retry]\nattempts = 2\n");
        let env = HashMap::from([("APP__RETRY__ATTEMPTS".to_string(), "5".to_string())]);
        let config = load(file.path(), Some(env)).unwrap();
        assert_eq!(config.retry.attempts, 5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config("[database]\nmax_connections = 2\nmin_connections = 3\n");
        let err = load(file.path(), Some(HashMap::new())).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let file = write_config("[retry]\nattempts = 0\n");
        assert!(load(file.path(), Some(HashMap::new())).is_err());

        let file = write_config("[analytics]\nmax_period_days = 0\n");
        assert!(load(file.path(), Some(HashMap::new())).is_err());
    }
}
