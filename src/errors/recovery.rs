//! Recovery policy and user-facing messages

use super::{ErrorKind, StorageError};
use serde::{Deserialize, Serialize};

/// Recommendation derived from an error kind; never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub can_retry: bool,
    pub retry_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub alternative_action_label: Option<String>,
    pub suggested_user_action: Option<String>,
}

/// Known structured codes: (code, kind, canned message)
const ERROR_CODES: &[(&str, ErrorKind, &str)] = &[
    ("FILE_TOO_LARGE", ErrorKind::Validation, "This file is too large to upload."),
    ("INVALID_FILE_TYPE", ErrorKind::Validation, "This file type is not supported."),
    ("QUOTA_EXCEEDED", ErrorKind::StorageQuota, "You have run out of storage space."),
    ("NETWORK_ERROR", ErrorKind::Network, "Unable to reach the server. Check your internet connection."),
    ("TIMEOUT", ErrorKind::Network, "The request took too long. Please try again."),
    ("UNAUTHORIZED", ErrorKind::Authentication, "Your session has expired. Please sign in again."),
    ("FORBIDDEN", ErrorKind::Permission, "You don't have permission to do that."),
    ("NOT_FOUND", ErrorKind::FileNotFound, "The file could not be found. It may have been moved or deleted."),
    ("FOLDER_NOT_EMPTY", ErrorKind::FolderNotEmpty, "This folder still contains files."),
    ("RATE_LIMITED", ErrorKind::RateLimit, "Too many requests. Please wait a moment."),
    ("SERVER_ERROR", ErrorKind::ServerError, "Something went wrong on our end. Please try again later."),
    ("UPLOAD_FAILED", ErrorKind::Upload, "The upload could not be completed."),
];

/// Look up a structured code
pub(crate) fn lookup_code(code: &str) -> Option<(&'static str, ErrorKind)> {
    ERROR_CODES
        .iter()
        .find(|(known, _, _)| *known == code)
        .map(|(known, kind, _)| (*known, *kind))
}

fn code_message(code: &str) -> Option<&'static str> {
    ERROR_CODES
        .iter()
        .find(|(known, _, _)| *known == code)
        .map(|(_, _, message)| *message)
}

fn kind_message(kind: ErrorKind) -> Option<&'static str> {
    let message = match kind {
        ErrorKind::Upload => "The upload could not be completed.",
        ErrorKind::Download => "The download could not be completed.",
        ErrorKind::Delete => "The item could not be deleted.",
        ErrorKind::Share => "The item could not be shared.",
        ErrorKind::Network => "Connection problem. Check your internet connection and try again.",
        ErrorKind::Permission => "You don't have permission to access this item.",
        ErrorKind::Validation => "Some of the information provided is not valid.",
        ErrorKind::StorageQuota => "You have run out of storage space.",
        ErrorKind::FileNotFound => "The file could not be found.",
        ErrorKind::FolderNotEmpty => "This folder still contains files.",
        ErrorKind::Authentication => "Please sign in to continue.",
        ErrorKind::RateLimit => "Too many requests. Please wait a moment.",
        ErrorKind::ServerError => "The server ran into a problem. Please try again later.",
        ErrorKind::Unknown => return None,
    };
    Some(message)
}

/// (suggested user action, alternative action label)
fn kind_actions(kind: ErrorKind) -> (Option<&'static str>, Option<&'static str>) {
    match kind {
        ErrorKind::Network => (Some("Check your internet connection"), Some("Work Offline")),
        ErrorKind::Permission => (Some("Sign in to your account"), Some("Request Access")),
        ErrorKind::Authentication => (Some("Sign in again"), Some("Sign In")),
        ErrorKind::StorageQuota => (Some("Free up space or upgrade your plan"), Some("Manage Storage")),
        ErrorKind::FileNotFound => (Some("Refresh the file list"), Some("Refresh")),
        ErrorKind::FolderNotEmpty => (Some("Move or delete the folder contents first"), Some("Open Folder")),
        ErrorKind::Validation => (Some("Check the file and try again"), None),
        ErrorKind::RateLimit => (Some("Wait a moment before trying again"), None),
        ErrorKind::ServerError => (Some("Try again in a few minutes"), Some("Contact Support")),
        ErrorKind::Upload => (Some("Try uploading the file again"), None),
        ErrorKind::Download => (Some("Try downloading the file again"), None),
        ErrorKind::Delete | ErrorKind::Share => (Some("Try again"), None),
        ErrorKind::Unknown => (None, Some("Contact Support")),
    }
}

/// Derive the recovery plan for an error
pub fn recovery_plan(error: &StorageError) -> RecoveryPlan {
    let (retry_delay_ms, max_retries) = match error.kind {
        ErrorKind::Network => (Some(1_000), Some(3)),
        ErrorKind::ServerError => (Some(2_000), Some(3)),
        ErrorKind::RateLimit => (Some(5_000), Some(2)),
        _ => (None, None),
    };
    let (suggested, alternative) = kind_actions(error.kind);

    RecoveryPlan {
        can_retry: error.kind.is_retryable(),
        retry_delay_ms,
        max_retries,
        alternative_action_label: alternative.map(str::to_string),
        suggested_user_action: suggested.map(str::to_string),
    }
}

/// Canned, non-technical message for an error.
///
/// Structured code first, then the kind's generic message, then the raw
/// message.
pub fn user_facing_message(error: &StorageError) -> String {
    error
        .code()
        .and_then(code_message)
        .or_else(|| kind_message(error.kind))
        .map(str::to_string)
        .unwrap_or_else(|| {
            if error.message.trim().is_empty() {
                "Something went wrong.".to_string()
            } else {
                error.message.clone()
            }
        })
}

/// Whether an error should be forwarded to error reporting
pub fn should_report(error: &StorageError) -> bool {
    !matches!(
        error.kind,
        ErrorKind::Validation | ErrorKind::Permission | ErrorKind::Authentication
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;
    use anyhow::anyhow;

    #[test]
    fn test_only_transient_kinds_retry() {
        for kind in ErrorKind::ALL {
            let plan = recovery_plan(&StorageError::new(kind, "x"));
            let expected = matches!(
                kind,
                ErrorKind::Network | ErrorKind::ServerError | ErrorKind::RateLimit
            );
            assert_eq!(plan.can_retry, expected, "{}", kind);
            assert_eq!(plan.retry_delay_ms.is_some(), expected, "{}", kind);
        }
    }

    #[test]
    fn test_network_messages_are_retryable() {
        for message in ["network down", "fetch failed", "lost connection"] {
            let error = classify(&anyhow!(message), None);
            assert_eq!(error.kind, ErrorKind::Network);
            assert!(recovery_plan(&error).can_retry);
        }
    }

    #[test]
    fn test_expected_failures_not_reported() {
        for kind in [ErrorKind::Validation, ErrorKind::Permission, ErrorKind::Authentication] {
            let error = StorageError::new(kind, "expected");
            assert!(!should_report(&error));
            assert!(!recovery_plan(&error).can_retry);
        }
        assert!(should_report(&StorageError::new(ErrorKind::ServerError, "boom")));
        assert!(should_report(&StorageError::new(ErrorKind::Unknown, "?")));
    }

    #[test]
    fn test_permission_actions() {
        let plan = recovery_plan(&StorageError::new(ErrorKind::Permission, "403"));
        assert_eq!(plan.suggested_user_action.as_deref(), Some("Sign in to your account"));
        assert_eq!(plan.alternative_action_label.as_deref(), Some("Request Access"));
    }

    #[test]
    fn test_canned_code_message_differs_from_raw() {
        let error = classify(&anyhow!("FILE_TOO_LARGE"), None);
        let message = user_facing_message(&error);

        assert!(!message.is_empty());
        assert_ne!(message, "FILE_TOO_LARGE");
    }

    #[test]
    fn test_message_fallbacks() {
        let by_kind = StorageError::new(ErrorKind::Network, "ECONNRESET 10.0.0.1:443");
        assert_ne!(user_facing_message(&by_kind), by_kind.message);

        let unknown = StorageError::new(ErrorKind::Unknown, "disk controller exploded");
        assert_eq!(user_facing_message(&unknown), "disk controller exploded");

        let empty = StorageError::new(ErrorKind::Unknown, "  ");
        assert_eq!(user_facing_message(&empty), "Something went wrong.");
    }

    #[test]
    fn test_unknown_code_uses_kind_message() {
        let error = StorageError::new(ErrorKind::StorageQuota, "507").with_code("NOPE");
        assert_eq!(user_facing_message(&error), "You have run out of storage space.");
    }
}
