//! Retry Module - Exponential backoff around fallible async operations

mod driver;

pub use driver::RetryDriver;

use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed after the first failure (0 = never retry)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay before the retry that follows `attempts_made` earlier retries:
    /// `min(max_delay, base_delay * multiplier^attempts_made)`
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = i32::try_from(attempts_made).unwrap_or(i32::MAX);
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum RetryError {
    /// Non-retryable failure, or retries exhausted
    #[error("{error} (after {attempts} attempt(s))")]
    Failed { error: StorageError, attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,
}

impl RetryError {
    /// The classified error, unless cancelled
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            RetryError::Failed { error, .. } => Some(error),
            RetryError::Cancelled => None,
        }
    }

    /// Invocations made by the failing call
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } => *attempts,
            RetryError::Cancelled => 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_growth_and_cap() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(3), Duration::from_secs(8));
        assert_eq!(config.delay_for(4), Duration::from_secs(10));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: RetryConfig = serde_json::from_str(r#"{ "max_attempts": 5 }"#).unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 1_000);
        assert_eq!(config.backoff_multiplier, 2.0);
    }
}
