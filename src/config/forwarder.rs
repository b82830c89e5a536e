//! Forwarder configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::events::{BackoffPolicy, ForwarderConfig, RetentionPolicy};

/// Outbox forwarder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderSettings {
    /// Cursor name in `outbox_cursors`
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Max entries fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Idle sleep between polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of a single publish in milliseconds
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// `retain` keeps forwarded entries, `delete` purges them after each batch
    #[serde(default = "default_retention")]
    pub retention: String,
}

impl ForwarderSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy, ValidationError> {
        match self.retention.to_ascii_lowercase().as_str() {
            "retain" => Ok(RetentionPolicy::Retain),
            "delete" => Ok(RetentionPolicy::DeleteForwarded),
            other => Err(ValidationError::UnknownRetention(other.to_string())),
        }
    }

    /// Validate forwarder configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.consumer_name.is_empty() {
            return Err(ValidationError::MissingRequired("FORWARDER_CONSUMER_NAME"));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::MustBePositive("batch_size"));
        }
        if self.publish_timeout_ms == 0 {
            return Err(ValidationError::MustBePositive("publish_timeout_ms"));
        }
        if self.backoff_base_ms == 0 {
            return Err(ValidationError::MustBePositive("backoff_base_ms"));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(ValidationError::InvalidJitter);
        }
        self.retention_policy()?;
        Ok(())
    }

    /// Builds the runtime forwarder config. Call after `validate()`.
    pub fn forwarder_config(&self) -> Result<ForwarderConfig, ValidationError> {
        let backoff = BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
            self.backoff_jitter,
        );

        Ok(ForwarderConfig::default()
            .with_consumer_name(self.consumer_name.clone())
            .with_batch_size(self.batch_size)
            .with_poll_interval(self.poll_interval())
            .with_publish_timeout(self.publish_timeout())
            .with_backoff(backoff)
            .with_retention(self.retention_policy()?))
    }
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self {
            consumer_name: default_consumer_name(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            retention: default_retention(),
        }
    }
}

fn default_consumer_name() -> String {
    "outbox-forwarder".to_string()
}

fn default_batch_size() -> u32 {
    100
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_jitter() -> f64 {
    0.1
}

fn default_retention() -> String {
    "retain".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let settings = ForwarderSettings::default();
        let config = settings.forwarder_config().unwrap();
        let runtime = ForwarderConfig::default();

        assert_eq!(config.consumer_name, runtime.consumer_name);
        assert_eq!(config.batch_size, runtime.batch_size);
        assert_eq!(config.poll_interval, runtime.poll_interval);
        assert_eq!(config.publish_timeout, runtime.publish_timeout);
        assert_eq!(config.retention, RetentionPolicy::Retain);
    }

    #[test]
    fn test_retention_parsing() {
        let mut settings = ForwarderSettings::default();

        settings.retention = "DELETE".to_string();
        assert_eq!(settings.retention_policy().unwrap(), RetentionPolicy::DeleteForwarded);

        settings.retention = "archive".to_string();
        assert!(matches!(
            settings.retention_policy(),
            Err(ValidationError::UnknownRetention(_))
        ));
    }

    #[test]
    fn test_validation_zero_batch_size() {
        let settings = ForwarderSettings {
            batch_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_backoff_base_above_max() {
        let settings = ForwarderSettings {
            backoff_base_ms: 5000,
            backoff_max_ms: 1000,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ValidationError::InvalidBackoff)));
    }

    #[test]
    fn test_validation_jitter_out_of_range() {
        let settings = ForwarderSettings {
            backoff_jitter: 1.5,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ValidationError::InvalidJitter)));
    }

    #[test]
    fn test_forwarder_config_carries_durations() {
        let settings = ForwarderSettings {
            poll_interval_ms: 250,
            publish_timeout_ms: 750,
            backoff_base_ms: 10,
            backoff_max_ms: 40,
            ..Default::default()
        };

        let config = settings.forwarder_config().unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.publish_timeout, Duration::from_millis(750));
        assert_eq!(config.backoff.base_delay, Duration::from_millis(10));
        assert_eq!(config.backoff.max_delay, Duration::from_millis(40));
    }
}
