//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("{0} must be greater than 0")]
    MustBePositive(&'static str),

    #[error("Backoff base delay exceeds max delay")]
    InvalidBackoff,

    #[error("Backoff jitter must be within 0.0..=1.0")]
    InvalidJitter,

    #[error("Unknown retention policy: {0}")]
    UnknownRetention(String),

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
