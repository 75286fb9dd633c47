//! Errors Module - Failure taxonomy and recovery policy
//!
//! Maps raw failures from storage collaborators into a closed set of
//! [`ErrorKind`]s and derives what the user (or the retry driver) should do
//! about them.

mod classifier;
mod handler;
mod recovery;

pub use classifier::{classify, ErrorContext};
pub use handler::{ErrorHandler, ErrorReporter, TracingReporter};
pub use recovery::{recovery_plan, should_report, user_facing_message, RecoveryPlan};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Upload,
    Download,
    Delete,
    Share,
    Network,
    Permission,
    Validation,
    StorageQuota,
    FileNotFound,
    FolderNotEmpty,
    Authentication,
    RateLimit,
    ServerError,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::Upload,
        ErrorKind::Download,
        ErrorKind::Delete,
        ErrorKind::Share,
        ErrorKind::Network,
        ErrorKind::Permission,
        ErrorKind::Validation,
        ErrorKind::StorageQuota,
        ErrorKind::FileNotFound,
        ErrorKind::FolderNotEmpty,
        ErrorKind::Authentication,
        ErrorKind::RateLimit,
        ErrorKind::ServerError,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Upload => "upload",
            ErrorKind::Download => "download",
            ErrorKind::Delete => "delete",
            ErrorKind::Share => "share",
            ErrorKind::Network => "network",
            ErrorKind::Permission => "permission",
            ErrorKind::Validation => "validation",
            ErrorKind::StorageQuota => "storage_quota",
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::FolderNotEmpty => "folder_not_empty",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transient kinds the retry driver may re-attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::ServerError | ErrorKind::RateLimit
        )
    }

    /// Default value of [`StorageError::recoverable`] for this kind
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::ServerError
                | ErrorKind::RateLimit
                | ErrorKind::Upload
                | ErrorKind::Download
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified storage failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct StorageError {
    /// Failure kind
    pub kind: ErrorKind,

    /// Human readable (technical) message
    pub message: String,

    /// Free-form details; `code` holds a structured error code when known
    pub details: BTreeMap<String, serde_json::Value>,

    /// Whether the user can recover from this failure
    pub recoverable: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Correlation id tying the error to a logical operation
    pub correlation_id: Option<String>,
}

impl StorageError {
    /// Create a new error; `recoverable` follows the kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
            recoverable: kind.is_recoverable(),
            created_at: Utc::now(),
            correlation_id: None,
        }
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach a structured error code
    pub fn with_code(self, code: impl Into<String>) -> Self {
        let code: String = code.into();
        self.with_detail("code", code)
    }

    /// Attach a correlation id
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Override the kind-derived recoverability
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Structured error code, if any
    pub fn code(&self) -> Option<&str> {
        self.details.get("code").and_then(|v| v.as_str())
    }
}

/// Failure reported by a transport collaborator with structured fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,

    /// HTTP-like status code
    pub status: Option<u16>,

    /// Structured error code (e.g. `QUOTA_EXCEEDED`)
    pub code: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_follows_kind() {
        assert!(StorageError::new(ErrorKind::Network, "offline").recoverable);
        assert!(!StorageError::new(ErrorKind::Permission, "nope").recoverable);

        let exhausted = StorageError::new(ErrorKind::Network, "offline").with_recoverable(false);
        assert!(!exhausted.recoverable);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::StorageQuota).unwrap();
        assert_eq!(json, "\"storage_quota\"");

        for kind in ErrorKind::ALL {
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_code_detail() {
        let err = StorageError::new(ErrorKind::Validation, "too big").with_code("FILE_TOO_LARGE");
        assert_eq!(err.code(), Some("FILE_TOO_LARGE"));
        assert_eq!(err.to_string(), "validation error: too big");
    }
}
