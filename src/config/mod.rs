//! Application configuration
//!
//! Loaded from environment variables (and a `.env` file when present) with the
//! `POINTS_OUTBOX` prefix; nested values use `__` as separator.
//!
//! ```no_run
//! use points_outbox::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod forwarder;
mod logging;
mod redis;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use forwarder::ForwarderSettings;
pub use logging::LoggingConfig;
pub use redis::RedisConfig;

use serde::Deserialize;

/// Root configuration of the `points-outbox` process.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,

    /// Redis Streams transport and discount consumer
    pub redis: RedisConfig,

    #[serde(default)]
    pub forwarder: ForwarderSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// - `POINTS_OUTBOX__DATABASE__URL=...` -> `database.url`
    /// - `POINTS_OUTBOX__FORWARDER__BATCH_SIZE=50` -> `forwarder.batch_size`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("POINTS_OUTBOX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.redis.validate()?;
        self.forwarder.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::RetentionPolicy;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("POINTS_OUTBOX__DATABASE__URL", "postgresql://test@localhost/points");
        env::set_var("POINTS_OUTBOX__REDIS__URL", "redis://localhost:6379");
    }

    fn clear_env() {
        env::remove_var("POINTS_OUTBOX__DATABASE__URL");
        env::remove_var("POINTS_OUTBOX__REDIS__URL");
        env::remove_var("POINTS_OUTBOX__FORWARDER__BATCH_SIZE");
        env::remove_var("POINTS_OUTBOX__FORWARDER__RETENTION");
        env::remove_var("POINTS_OUTBOX__LOGGING__JSON");
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/points");
        assert_eq!(config.redis.url, "redis://localhost:6379");
    }

    #[test]
    fn test_minimal_config_validates() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.forwarder.batch_size, 100);
        assert_eq!(config.forwarder.consumer_name, "outbox-forwarder");
        assert_eq!(config.redis.consumer_group, "orders-svc");
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("POINTS_OUTBOX__FORWARDER__BATCH_SIZE", "25");
        env::set_var("POINTS_OUTBOX__FORWARDER__RETENTION", "delete");
        env::set_var("POINTS_OUTBOX__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.forwarder.batch_size, 25);
        assert!(config.logging.json);
        assert_eq!(
            config.forwarder.forwarder_config().unwrap().retention,
            RetentionPolicy::DeleteForwarded
        );
    }

    #[test]
    fn test_missing_database_url_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("POINTS_OUTBOX__REDIS__URL", "redis://localhost:6379");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
