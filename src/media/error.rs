use std::time::Duration;

use thiserror::Error;

/// Per-image failure.
///
/// The `Display` text of every variant is safe to show to an end user; the
/// pipeline turns each error into a `"Skipped image: ..."` warning rather than
/// failing the whole request.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("URL host is not an allowed Slack domain: {url}")]
    HostRejected { url: String },

    #[error("file '{name}' is not an image (type: {mime_type}); only PNG, JPEG, GIF and WebP are supported")]
    UnsupportedFormat { name: String, mime_type: String },

    #[error("image '{name}' size {size} bytes exceeds limit")]
    DeclaredSizeExceeded { name: String, size: u64 },

    #[error("image size {size} bytes exceeds maximum allowed size of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("failed to download image: {0:#}")]
    FetchFailed(#[source] anyhow::Error),

    #[error("failed to download image: timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("failed to download image: request cancelled")]
    Cancelled,

    #[error("authentication failed: received HTML login page instead of image (browser tokens may not support file downloads)")]
    AuthFailureDetected,

    #[error("downloaded data is not a valid image format")]
    ContentFormatInvalid,

    #[error("image compression failed: {0}")]
    CompressionFailed(String),

    #[error("file_id parameter is required")]
    MissingFileId,

    #[error("image downloads not supported with browser tokens (xoxc/xoxd); use OAuth tokens (xoxp/xoxb) instead")]
    DownloadsUnsupported,

    #[error("file '{name}' does not have a download URL available")]
    MissingDownloadUrl { name: String },

    #[error("failed to get file info: {0:#}")]
    FileInfo(#[source] anyhow::Error),
}

impl ImageError {
    /// Render the error as the warning line reported alongside delivered images.
    pub fn to_warning(&self) -> String {
        format!("Skipped image: {self}")
    }
}
