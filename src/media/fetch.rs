//! Bounded image fetching.
//!
//! Two modes share the same per-item fetch: a pooled mode that downloads
//! every reference concurrently behind a semaphore, and the one-at-a-time
//! fetch the budgeted assembler drives itself. Every fetch carries its own
//! timeout; there is no aggregate deadline across a batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ImageError;
use super::reference::{ImageKey, ImageReference};
use super::sniff::classify_payload;
use super::ImageSettings;

/// Transport that can stream a file's bytes into a sink.
///
/// Implementations own authentication and TLS; the fetcher wraps every call
/// in its own timeout and cancellation.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn download(&self, url: &str, sink: &mut Vec<u8>) -> anyhow::Result<()>;
}

/// Result of fetching one reference.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub key: ImageKey,
    pub result: Result<Bytes, ImageError>,
}

/// Output of a pooled fetch.
#[derive(Debug, Default)]
pub struct PooledDownload {
    pub images: HashMap<ImageKey, Bytes>,
    pub warnings: Vec<String>,
}

/// Download a single URL and validate that the bytes are an image.
pub async fn fetch_image(
    downloader: &dyn FileDownloader,
    url: &str,
    settings: &ImageSettings,
    cancel: &CancellationToken,
) -> Result<Bytes, ImageError> {
    if !settings.allowlist.allows(url) {
        return Err(ImageError::HostRejected {
            url: url.to_string(),
        });
    }

    let mut data = Vec::new();
    let fetched = {
        let download = timeout(settings.download_timeout, downloader.download(url, &mut data));
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ImageError::Cancelled),
            result = download => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ImageError::FetchFailed(err)),
                Err(_) => Err(ImageError::TimedOut {
                    timeout: settings.download_timeout,
                }),
            },
        }
    };
    fetched?;

    let size = data.len() as u64;
    if size > settings.max_image_bytes {
        return Err(ImageError::SizeExceeded {
            size,
            limit: settings.max_image_bytes,
        });
    }

    let format = classify_payload(&data)?;
    debug!(url, size, %format, "image downloaded");
    Ok(Bytes::from(data))
}

/// Fetch a reference, refusing up front if its declared size is over the ceiling.
pub async fn fetch_reference(
    downloader: &dyn FileDownloader,
    image: &ImageReference,
    settings: &ImageSettings,
    cancel: &CancellationToken,
) -> Result<Bytes, ImageError> {
    if let Some(size) = image.declared_size() {
        if size > settings.max_image_bytes {
            return Err(ImageError::DeclaredSizeExceeded {
                name: image.name.clone(),
                size,
            });
        }
    }
    fetch_image(downloader, &image.url, settings, cancel).await
}

/// Download up to `max_images_per_call` references concurrently.
///
/// One task is spawned per reference and each holds a semaphore permit for the
/// duration of its fetch, so at most `max_concurrent_downloads` fetches are in
/// flight. Results are gathered by this function alone. Failures become
/// warnings; they never fail the batch.
pub async fn fetch_pooled(
    downloader: Arc<dyn FileDownloader>,
    images: &[ImageReference],
    settings: Arc<ImageSettings>,
    cancel: CancellationToken,
) -> PooledDownload {
    let images = &images[..images.len().min(settings.max_images_per_call)];
    let mut download = PooledDownload::default();
    if images.is_empty() {
        return download;
    }

    let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_downloads.max(1)));
    let mut tasks = JoinSet::new();

    for image in images.iter().cloned() {
        let downloader = Arc::clone(&downloader);
        let settings = Arc::clone(&settings);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let key = image.key();
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    fetch_reference(downloader.as_ref(), &image, &settings, &cancel).await
                }
                Err(_) => Err(ImageError::Cancelled),
            };
            DownloadOutcome { key, result }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(DownloadOutcome {
                key,
                result: Ok(data),
            }) => {
                download.images.insert(key, data);
            }
            Ok(DownloadOutcome {
                key,
                result: Err(err),
            }) => {
                warn!(%key, error = %err, "skipping image");
                download.warnings.push(err.to_warning());
            }
            Err(err) => {
                warn!(error = %err, "image download task failed");
                download
                    .warnings
                    .push(format!("Skipped image: download task failed: {err}"));
            }
        }
    }

    debug!(
        downloaded = download.images.len(),
        failed = download.warnings.len(),
        "pooled image download finished"
    );
    download
}
