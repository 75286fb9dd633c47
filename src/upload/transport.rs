//! Injected collaborators: byte transport and thumbnail generation

use super::{FileProgress, StoredObject, ThumbnailOptions, UploadFile, UploadOptions};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-file progress sink handed to the transport
pub type ProgressCallback = Arc<dyn Fn(FileProgress) + Send + Sync>;

/// Moves file bytes to storage.
///
/// Implementations report non-decreasing progress ending at 100 on success
/// and fail with an error (optionally a [`crate::errors::TransportError`] or
/// an already classified [`crate::errors::StorageError`]).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn upload(
        &self,
        file: &UploadFile,
        options: &UploadOptions,
        on_progress: ProgressCallback,
    ) -> anyhow::Result<StoredObject>;
}

/// Produces a thumbnail URL or handle for a stored media file
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate_thumbnail(
        &self,
        file: &UploadFile,
        options: &ThumbnailOptions,
    ) -> anyhow::Result<String>;
}

/// Whether thumbnails are attempted for this MIME type
pub(crate) fn supports_thumbnail(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type.starts_with("video/")
}
