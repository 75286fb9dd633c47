//! Upload Module - Validated, concurrent multi-file uploads
//!
//! Files are validated against size/type constraints, then every accepted
//! file is uploaded concurrently through an injected [`Transport`], with
//! transient failures retried by the [`crate::retry::RetryDriver`].

mod coordinator;
mod transport;
mod validation;

pub use coordinator::{
    BatchOutcome, BatchProgress, BatchReport, CompletionCallback, UploadCoordinator, UploadFailure,
};
pub use transport::{ProgressCallback, ThumbnailGenerator, Transport};
pub use validation::{matches_mime_pattern, Submission, ValidationError};

use crate::retry::RetryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MB: u64 = 1024 * 1024;

/// Thumbnail request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailOptions {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub format: String,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            quality: 80,
            format: "webp".to_string(),
        }
    }
}

/// Upload constraints and behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size (bytes)
    pub max_file_size: u64,

    /// MIME allow-list; `type/*` matches by prefix, anything else exactly
    pub allowed_types: Vec<String>,

    /// Accept more than one file per submission
    pub multiple: bool,

    /// Retry policy for transient transport failures
    pub retry: RetryConfig,

    /// Generate thumbnails for images and videos after upload
    pub generate_thumbnails: bool,

    pub thumbnail: ThumbnailOptions,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * MB,
            allowed_types: [
                "image/*",
                "video/*",
                "audio/*",
                "text/*",
                "application/pdf",
                "application/zip",
                "application/json",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.ms-powerpoint",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            multiple: true,
            retry: RetryConfig::default(),
            generate_thumbnails: true,
            thumbnail: ThumbnailOptions::default(),
        }
    }
}

/// Transport-level options forwarded with every upload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Destination folder
    pub folder_id: Option<String>,
}

/// File offered for upload, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub size: u64,

    /// MIME type reported by the picker; guessed from the name when absent
    pub declared_type: Option<String>,

    /// Local path, when the file lives on disk
    pub path: Option<PathBuf>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, size: u64, declared_type: impl Into<String>) -> Self {
        let declared_type: String = declared_type.into();
        Self {
            name: name.into(),
            size,
            declared_type: (!declared_type.trim().is_empty()).then_some(declared_type),
            path: None,
        }
    }

    /// Build a candidate from a file on disk
    pub async fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: metadata.len(),
            declared_type: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Effective MIME type
    pub fn mime_type(&self) -> String {
        match &self.declared_type {
            Some(declared) => declared.to_ascii_lowercase(),
            None => mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

/// File accepted into a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub file_id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub path: Option<PathBuf>,
}

/// Per-file upload state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Error)
    }
}

/// Observable state of one file's upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTask {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub declared_type: String,
    pub progress: u8,
    pub status: UploadStatus,
    pub error_message: Option<String>,
}

impl UploadTask {
    fn pending(file: &UploadFile) -> Self {
        Self {
            file_id: file.file_id.clone(),
            file_name: file.name.clone(),
            file_size: file.size,
            declared_type: file.mime_type.clone(),
            progress: 0,
            status: UploadStatus::Pending,
            error_message: None,
        }
    }
}

/// Progress tick reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    pub file_id: String,
    pub file_name: String,

    /// 0-100
    pub progress: u8,
    pub status: UploadStatus,
}

/// Descriptor of a stored object returned by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mime_type_resolution() {
        assert_eq!(CandidateFile::new("a.bin", 1, "Image/PNG").mime_type(), "image/png");
        assert_eq!(CandidateFile::new("photo.jpg", 1, "").mime_type(), "image/jpeg");
        assert_eq!(
            CandidateFile::new("mystery", 1, "").mime_type(),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn test_candidate_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello libredrive").await.unwrap();

        let candidate = CandidateFile::from_path(&path).await.unwrap();

        assert_eq!(candidate.name, "notes.txt");
        assert_eq!(candidate.size, 16);
        assert_eq!(candidate.mime_type(), "text/plain");
        assert_eq!(candidate.path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_candidate_from_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = CandidateFile::from_path(temp_dir.path().join("missing.txt")).await;

        assert!(matches!(result, Err(crate::Error::Io(_))));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::Uploading.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
    }
}
