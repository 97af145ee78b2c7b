//! Image delivery pipeline.
//!
//! References are located in Slack messages, fetched through an
//! authenticated transport, validated by content sniffing, and optionally
//! re-encoded to fit an inline response budget. A misbehaving image never
//! fails the batch; it turns into a warning next to whatever did succeed.

pub mod budget;
pub mod compress;
pub mod error;
pub mod fetch;
pub mod host;
pub mod package;
pub mod reference;
pub mod retrieve;
pub mod sniff;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channels::slack::SlackMessage;
use crate::config::ImagesConfig;

pub use budget::Disposition;
pub use error::ImageError;
pub use fetch::FileDownloader;
pub use host::HostAllowlist;
pub use package::ImageContent;
pub use reference::{ImageKey, ImageReference};

/// Immutable runtime limits shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    /// Hard per-image ceiling, applied to declared and downloaded sizes.
    pub max_image_bytes: u64,
    pub max_images_per_call: usize,
    pub download_timeout: Duration,
    pub max_concurrent_downloads: usize,
    /// Default ceiling for the budgeted assembler.
    pub inline_budget_bytes: u64,
    /// Strictly descending JPEG qualities tried when transcoding PNGs.
    pub jpeg_qualities: Vec<u8>,
    pub allowlist: HostAllowlist,
}

impl ImageSettings {
    pub fn from_config(config: &ImagesConfig) -> Self {
        Self {
            max_image_bytes: config.max_image_bytes,
            max_images_per_call: config.max_images_per_call,
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            max_concurrent_downloads: config.max_concurrent_downloads,
            inline_budget_bytes: config.inline_budget_bytes,
            jpeg_qualities: config.jpeg_qualities.clone(),
            allowlist: HostAllowlist::new(&config.allowed_hosts),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self::from_config(&ImagesConfig::default())
    }
}

/// How a batch of references is turned into inline content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Concurrent fetch behind the worker pool, no re-encoding.
    Pooled,
    /// Sequential fetch and compression against a cumulative byte budget.
    Budgeted(u64),
}

/// Result of one pipeline invocation.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Delivered images in reference order.
    pub content: Vec<ImageContent>,
    /// One line per failed reference, safe to show to a user.
    pub warnings: Vec<String>,
    /// References left out because the budget ran out.
    pub skipped: Vec<ImageReference>,
    /// Per-reference outcome, in reference order. Budgeted mode only.
    pub dispositions: Vec<(ImageKey, Disposition)>,
    /// Bytes of delivered image data.
    pub total_bytes: u64,
}

/// Entry point tying reference extraction, fetch modes and packaging together.
#[derive(Clone)]
pub struct ImagePipeline {
    settings: Arc<ImageSettings>,
    downloader: Arc<dyn FileDownloader>,
}

impl ImagePipeline {
    pub fn new(settings: ImageSettings, downloader: Arc<dyn FileDownloader>) -> Self {
        Self {
            settings: Arc::new(settings),
            downloader,
        }
    }

    pub fn settings(&self) -> &ImageSettings {
        &self.settings
    }

    /// Every image reference in `messages`, in message order.
    pub fn references(&self, messages: &[SlackMessage]) -> Vec<ImageReference> {
        messages
            .iter()
            .flat_map(|message| reference::images_from_slack_message(message, &self.settings.allowlist))
            .collect()
    }

    /// Budgeted delivery against the configured inline budget.
    pub fn default_mode(&self) -> DeliveryMode {
        DeliveryMode::Budgeted(self.settings.inline_budget_bytes)
    }

    pub async fn deliver(
        &self,
        images: &[ImageReference],
        mode: DeliveryMode,
        cancel: CancellationToken,
    ) -> Delivery {
        let images = &images[..images.len().min(self.settings.max_images_per_call)];

        let delivery = match mode {
            DeliveryMode::Pooled => {
                let pooled = fetch::fetch_pooled(
                    Arc::clone(&self.downloader),
                    images,
                    Arc::clone(&self.settings),
                    cancel,
                )
                .await;
                let content = package::package(images, &pooled.images, &Default::default());
                let total_bytes = content.iter().map(|c| c.data.len() as u64).sum();
                Delivery {
                    content,
                    warnings: pooled.warnings,
                    skipped: Vec::new(),
                    dispositions: Vec::new(),
                    total_bytes,
                }
            }
            DeliveryMode::Budgeted(budget) => {
                let budgeted = budget::fetch_within_budget(
                    self.downloader.as_ref(),
                    images,
                    &self.settings,
                    budget,
                    &cancel,
                )
                .await;
                Delivery {
                    content: package::package(images, &budgeted.images, &budgeted.mime_overrides),
                    warnings: budgeted.warnings,
                    skipped: budgeted.skipped,
                    dispositions: budgeted.dispositions,
                    total_bytes: budgeted.total_bytes,
                }
            }
        };

        info!(
            requested = images.len(),
            delivered = delivery.content.len(),
            warnings = delivery.warnings.len(),
            skipped = delivery.skipped.len(),
            total_bytes = delivery.total_bytes,
            "image delivery finished"
        );
        delivery
    }
}
