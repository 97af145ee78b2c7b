//! Fetching a single image by its Slack file ID.
//!
//! Used for images that were left out of an inline batch, typically because
//! the budget ran out. Unlike batch delivery, every failure here is returned
//! to the caller.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::compress::compress_to_budget_blocking;
use super::error::ImageError;
use super::fetch::{fetch_image, FileDownloader};
use super::package::ImageContent;
use super::sniff::is_supported_mime;
use super::ImageSettings;
use crate::channels::slack::SlackFile;

/// File metadata lookup, backed by `files.info` in production.
#[async_trait]
pub trait FileInfoLookup: Send + Sync {
    /// False when the credentials cannot download private files at all.
    fn can_download_files(&self) -> bool;

    async fn file_info(&self, file_id: &str) -> anyhow::Result<SlackFile>;
}

#[derive(Debug, Clone)]
pub struct RetrievedImage {
    pub name: String,
    pub content: ImageContent,
    pub original_size: u64,
    pub was_converted: bool,
}

impl RetrievedImage {
    /// Short text block describing the image, sent alongside it.
    pub fn summary(&self) -> String {
        format!(
            "File: {}\nSize: {} bytes\nType: {}",
            self.name,
            self.content.data.len(),
            self.content.mime_type
        )
    }
}

pub async fn retrieve_image(
    file_id: &str,
    lookup: &dyn FileInfoLookup,
    downloader: &dyn FileDownloader,
    settings: &ImageSettings,
    cancel: &CancellationToken,
) -> Result<RetrievedImage, ImageError> {
    let file_id = file_id.trim();
    if file_id.is_empty() {
        return Err(ImageError::MissingFileId);
    }
    if !lookup.can_download_files() {
        return Err(ImageError::DownloadsUnsupported);
    }

    let file = lookup.file_info(file_id).await.map_err(ImageError::FileInfo)?;

    if !is_supported_mime(&file.mimetype) {
        return Err(ImageError::UnsupportedFormat {
            name: file.name,
            mime_type: file.mimetype,
        });
    }

    let url = file
        .download_url()
        .ok_or_else(|| ImageError::MissingDownloadUrl {
            name: file.name.clone(),
        })?
        .to_string();

    if !settings.allowlist.allows(&url) {
        return Err(ImageError::HostRejected { url });
    }
    if file.size > settings.max_image_bytes {
        return Err(ImageError::DeclaredSizeExceeded {
            name: file.name,
            size: file.size,
        });
    }

    let data = fetch_image(downloader, &url, settings, cancel).await?;
    let result = compress_to_budget_blocking(
        data,
        file.mimetype.clone(),
        settings.inline_budget_bytes,
        settings.jpeg_qualities.clone(),
    )
    .await;

    info!(
        file_id,
        original_size = result.original_size,
        final_size = result.final_size,
        converted = result.was_converted,
        "image retrieved"
    );

    Ok(RetrievedImage {
        name: file.name,
        content: ImageContent {
            mime_type: result.mime_type,
            data: result.data,
        },
        original_size: result.original_size,
        was_converted: result.was_converted,
    })
}
