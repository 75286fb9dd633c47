//! Failure classification

use super::recovery::lookup_code;
use super::{ErrorKind, StorageError, TransportError};

/// Extra information about where a failure happened
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Logical operation (e.g. "upload")
    pub operation: Option<String>,

    /// File involved, if any
    pub file_name: Option<String>,

    /// Correlation id for log/report stitching
    pub correlation_id: Option<String>,
}

impl ErrorContext {
    pub fn operation(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Substring rules, matched case-insensitively in this exact order
const MESSAGE_RULES: &[(&[&str], ErrorKind)] = &[
    (&["network", "connection", "fetch"], ErrorKind::Network),
    (&["401", "unauthorized"], ErrorKind::Authentication),
    (&["403", "forbidden"], ErrorKind::Permission),
    (&["404", "not found"], ErrorKind::FileNotFound),
    (&["quota", "space"], ErrorKind::StorageQuota),
    (&["upload"], ErrorKind::Upload),
    (&["validation", "invalid"], ErrorKind::Validation),
];

/// Classify a raw failure.
///
/// A [`StorageError`] anywhere in the chain is returned unchanged. Otherwise
/// structured codes and statuses from a [`TransportError`] take precedence
/// over message matching.
pub fn classify(err: &anyhow::Error, context: Option<&ErrorContext>) -> StorageError {
    if let Some(classified) = err.chain().find_map(|e| e.downcast_ref::<StorageError>()) {
        return classified.clone();
    }

    let message = err.to_string();
    let transport = err.chain().find_map(|e| e.downcast_ref::<TransportError>());

    let (kind, code) = match transport.and_then(classify_transport) {
        Some(found) => found,
        None => match lookup_code(message.trim()) {
            Some((code, kind)) => (kind, Some(code)),
            None => (classify_message(&message), None),
        },
    };

    let mut error = StorageError::new(kind, message);
    if let Some(code) = code {
        error = error.with_code(code);
    }
    if let Some(status) = transport.and_then(|t| t.status) {
        error = error.with_detail("status", status);
    }
    if let Some(context) = context {
        error = apply_context(error, context);
    }
    error
}

/// Match a message against the ordered substring rules
pub(crate) fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

fn classify_transport(err: &TransportError) -> Option<(ErrorKind, Option<&'static str>)> {
    if let Some((code, kind)) = err.code.as_deref().and_then(lookup_code) {
        return Some((kind, Some(code)));
    }

    let kind = match err.status? {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Permission,
        404 => ErrorKind::FileNotFound,
        413 => ErrorKind::Validation,
        429 => ErrorKind::RateLimit,
        507 => ErrorKind::StorageQuota,
        500..=599 => ErrorKind::ServerError,
        _ => return None,
    };
    Some((kind, None))
}

fn apply_context(mut error: StorageError, context: &ErrorContext) -> StorageError {
    if let Some(operation) = &context.operation {
        error = error.with_detail("operation", operation.as_str());
    }
    if let Some(file_name) = &context.file_name {
        error = error.with_detail("file_name", file_name.as_str());
    }
    if let Some(id) = &context.correlation_id {
        error = error.with_correlation_id(id.as_str());
    }
    error
}
