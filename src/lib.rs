//! LibreDrive Resilience - Client-side error recovery for file storage
//!
//! This crate provides the pieces a storage client needs to survive a flaky
//! backend: classification of raw failures into typed errors with recovery
//! advice, exponential-backoff retries, a transient notification feed, and
//! validated concurrent multi-file uploads.

pub mod clock;
pub mod errors;
pub mod notifications;
pub mod retry;
pub mod upload;

use std::path::Path;
use thiserror::Error;

/// Main error type for resilience-layer operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] errors::StorageError),

    #[error("Retry error: {0}")]
    Retry(#[from] retry::RetryError),

    #[error("Validation error: {0}")]
    Validation(#[from] upload::ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Core configuration for the resilience layer
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Upload constraints and retry policy
    pub upload: upload::UploadConfig,

    /// Notification durations and limits
    pub notifications: notifications::NotificationConfig,
}

impl ResilienceConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        let retry = &self.upload.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                retry.backoff_multiplier
            )));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(Error::Config(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if self.upload.allowed_types.is_empty() {
            return Err(Error::Config("allowed_types must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Does nothing if a subscriber is
/// already installed.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.upload.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.upload.retry.max_attempts, 3);
        assert_eq!(config.notifications.max_notifications, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_config() {
        let config = ResilienceConfig::from_json_str(
            r#"{ "upload": { "multiple": false, "retry": { "max_attempts": 5 } } }"#,
        )
        .unwrap();

        assert!(!config.upload.multiple);
        assert_eq!(config.upload.retry.max_attempts, 5);
        assert_eq!(config.upload.retry.base_delay_ms, 1_000);
        assert_eq!(config.notifications.error_duration_ms, 8_000);
    }

    #[test]
    fn test_invalid_config() {
        let bad_multiplier = ResilienceConfig::from_json_str(r#"{ "upload": { "retry": { "backoff_multiplier": 0.5 } } }"#);
        assert!(matches!(bad_multiplier, Err(Error::Config(_))));

        let malformed = ResilienceConfig::from_json_str("{ upload: ");
        assert!(matches!(malformed, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_load_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("resilience.json");
        tokio::fs::write(&path, r#"{ "notifications": { "max_notifications": 3 } }"#)
            .await
            .unwrap();

        let config = ResilienceConfig::load(&path).await.unwrap();
        assert_eq!(config.notifications.max_notifications, 3);

        let missing = ResilienceConfig::load(temp_dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("drive_resilience=debug");
        init_tracing("info");
    }
}
