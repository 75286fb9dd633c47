//! Batch validation against size and type constraints

use super::{CandidateFile, UploadConfig, UploadFile};
use crate::errors::{ErrorKind, StorageError};
use thiserror::Error;
use uuid::Uuid;

/// Why a file was kept out of a batch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{file_name} is too large ({size} bytes, limit is {max} bytes)")]
    FileTooLarge { file_name: String, size: u64, max: u64 },

    #[error("{file_name} has an unsupported file type ({mime_type})")]
    UnsupportedType { file_name: String, mime_type: String },

    #[error("{file_name} is empty")]
    EmptyFile { file_name: String },

    #[error("{file_name} was skipped: only one file can be uploaded at a time")]
    TooManyFiles { file_name: String },
}

impl ValidationError {
    pub fn file_name(&self) -> &str {
        match self {
            ValidationError::FileTooLarge { file_name, .. }
            | ValidationError::UnsupportedType { file_name, .. }
            | ValidationError::EmptyFile { file_name }
            | ValidationError::TooManyFiles { file_name } => file_name,
        }
    }

    /// Structured error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::UnsupportedType { .. } => "INVALID_FILE_TYPE",
            ValidationError::EmptyFile { .. } => "EMPTY_FILE",
            ValidationError::TooManyFiles { .. } => "TOO_MANY_FILES",
        }
    }

    pub fn to_storage_error(&self) -> StorageError {
        StorageError::new(ErrorKind::Validation, self.to_string())
            .with_code(self.code())
            .with_detail("file_name", self.file_name())
    }
}

/// Result of validating a submitted batch
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub accepted: Vec<UploadFile>,
    pub rejected: Vec<ValidationError>,
}

/// Match a MIME type against an allow-list pattern
pub fn matches_mime_pattern(pattern: &str, mime_type: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime_type = mime_type.trim().to_ascii_lowercase();

    if pattern == "*" || pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => mime_type
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/')),
        None => pattern == mime_type,
    }
}

pub(crate) fn validate_file(file: &CandidateFile, config: &UploadConfig) -> Result<String, ValidationError> {
    if file.size == 0 {
        return Err(ValidationError::EmptyFile {
            file_name: file.name.clone(),
        });
    }

    if file.size > config.max_file_size {
        return Err(ValidationError::FileTooLarge {
            file_name: file.name.clone(),
            size: file.size,
            max: config.max_file_size,
        });
    }

    let mime_type = file.mime_type();
    if !config
        .allowed_types
        .iter()
        .any(|pattern| matches_mime_pattern(pattern, &mime_type))
    {
        return Err(ValidationError::UnsupportedType {
            file_name: file.name.clone(),
            mime_type,
        });
    }

    Ok(mime_type)
}

/// Split candidates into accepted uploads and per-file rejections
pub(crate) fn validate_batch(files: Vec<CandidateFile>, config: &UploadConfig) -> Submission {
    let mut submission = Submission::default();

    for (index, file) in files.into_iter().enumerate() {
        if !config.multiple && index > 0 {
            submission.rejected.push(ValidationError::TooManyFiles { file_name: file.name });
            continue;
        }

        match validate_file(&file, config) {
            Ok(mime_type) => submission.accepted.push(UploadFile {
                file_id: Uuid::new_v4().to_string(),
                name: file.name,
                size: file.size,
                mime_type,
                path: file.path,
            }),
            Err(err) => submission.rejected.push(err),
        }
    }

    submission
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_mime_patterns() {
        assert!(matches_mime_pattern("image/*", "image/png"));
        assert!(matches_mime_pattern("IMAGE/*", "image/svg+xml"));
        assert!(!matches_mime_pattern("image/*", "imagex/png"));
        assert!(!matches_mime_pattern("image/*", "video/mp4"));
        assert!(matches_mime_pattern("application/pdf", "application/pdf"));
        assert!(!matches_mime_pattern("application/pdf", "application/pdfx"));
        assert!(matches_mime_pattern("*/*", "anything/else"));
    }

    #[test]
    fn test_size_limit() {
        let config = UploadConfig::default();
        let files = vec![
            CandidateFile::new("a.jpg", 10 * MB, "image/jpeg"),
            CandidateFile::new("b.mp4", 200 * MB, "video/mp4"),
            CandidateFile::new("c.pdf", 5 * MB, "application/pdf"),
        ];

        let submission = validate_batch(files, &config);

        assert_eq!(submission.accepted.len(), 2);
        assert_eq!(submission.rejected.len(), 1);
        assert_eq!(submission.rejected[0].file_name(), "b.mp4");
        assert!(matches!(submission.rejected[0], ValidationError::FileTooLarge { .. }));
    }

    #[test]
    fn test_type_and_empty_rejections() {
        let config = UploadConfig::default();
        let files = vec![
            CandidateFile::new("setup.exe", MB, "application/x-msdownload"),
            CandidateFile::new("empty.txt", 0, "text/plain"),
            CandidateFile::new("notes.md", 10, ""),
        ];

        let submission = validate_batch(files, &config);

        assert_eq!(submission.accepted.len(), 1);
        assert_eq!(submission.accepted[0].name, "notes.md");
        assert_eq!(submission.rejected[0].code(), "INVALID_FILE_TYPE");
        assert_eq!(submission.rejected[1].code(), "EMPTY_FILE");
    }

    #[test]
    fn test_single_file_mode() {
        let config = UploadConfig {
            multiple: false,
            ..Default::default()
        };
        let files = vec![
            CandidateFile::new("a.png", 10, "image/png"),
            CandidateFile::new("b.png", 10, "image/png"),
        ];

        let submission = validate_batch(files, &config);

        assert_eq!(submission.accepted.len(), 1);
        assert!(matches!(submission.rejected[0], ValidationError::TooManyFiles { .. }));
    }

    #[test]
    fn test_accepted_files_get_unique_ids() {
        let files = vec![
            CandidateFile::new("a.png", 10, "image/png"),
            CandidateFile::new("a.png", 10, "image/png"),
        ];

        let submission = validate_batch(files, &UploadConfig::default());

        assert_ne!(submission.accepted[0].file_id, submission.accepted[1].file_id);
    }

    #[test]
    fn test_validation_error_as_storage_error() {
        let err = ValidationError::FileTooLarge {
            file_name: "big.iso".into(),
            size: 2,
            max: 1,
        };
        let storage = err.to_storage_error();

        assert_eq!(storage.kind, ErrorKind::Validation);
        assert_eq!(storage.code(), Some("FILE_TOO_LARGE"));
        assert!(!crate::errors::should_report(&storage));
    }
}
