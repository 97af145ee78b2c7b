//! Sequential assembly of images under a cumulative byte budget.
//!
//! Each inclusion decision depends on what earlier references committed, so
//! fetches run strictly one after another. Once a single image does not fit
//! the remaining budget, every later reference is skipped without a fetch.

use std::collections::HashMap;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::compress::compress_to_budget_blocking;
use super::error::ImageError;
use super::fetch::{fetch_reference, FileDownloader};
use super::reference::{ImageKey, ImageReference};
use super::ImageSettings;

/// Final state of one reference after assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Included,
    /// Declared or downloaded size over the per-image ceiling.
    SkippedTooLarge,
    SkippedError,
    SkippedBudget,
}

#[derive(Debug, Default)]
pub struct BudgetedDownload {
    pub images: HashMap<ImageKey, Bytes>,
    /// Effective MIME type for references that were transcoded.
    pub mime_overrides: HashMap<ImageKey, String>,
    /// References dropped by the budget, in order.
    pub skipped: Vec<ImageReference>,
    pub warnings: Vec<String>,
    pub dispositions: Vec<(ImageKey, Disposition)>,
    pub total_bytes: u64,
}

#[derive(Debug)]
struct BudgetState {
    used: u64,
    ceiling: u64,
    exceeded: bool,
}

impl BudgetState {
    fn new(ceiling: u64) -> Self {
        Self {
            used: 0,
            ceiling,
            exceeded: false,
        }
    }

    fn remaining(&self) -> u64 {
        self.ceiling.saturating_sub(self.used)
    }

    /// Commit `len` bytes, or trip the sticky flag if they do not fit.
    fn try_commit(&mut self, len: u64) -> bool {
        if self.used.saturating_add(len) > self.ceiling {
            self.exceeded = true;
            return false;
        }
        self.used += len;
        true
    }
}

/// Fetch, compress and admit references in order until the budget runs out.
pub async fn fetch_within_budget(
    downloader: &dyn FileDownloader,
    images: &[ImageReference],
    settings: &ImageSettings,
    budget: u64,
    cancel: &CancellationToken,
) -> BudgetedDownload {
    let images = &images[..images.len().min(settings.max_images_per_call)];
    let mut state = BudgetState::new(budget);
    let mut out = BudgetedDownload::default();

    for image in images {
        let key = image.key();

        if state.exceeded {
            out.skipped.push(image.clone());
            out.dispositions.push((key, Disposition::SkippedBudget));
            continue;
        }

        let data = match fetch_reference(downloader, image, settings, cancel).await {
            Ok(data) => data,
            Err(err) => {
                warn!(%key, error = %err, "skipping image");
                let disposition = match err {
                    ImageError::DeclaredSizeExceeded { .. } | ImageError::SizeExceeded { .. } => {
                        Disposition::SkippedTooLarge
                    }
                    _ => Disposition::SkippedError,
                };
                out.warnings.push(err.to_warning());
                out.dispositions.push((key, disposition));
                continue;
            }
        };

        let result = compress_to_budget_blocking(
            data,
            image.mime_type.clone(),
            state.remaining(),
            settings.jpeg_qualities.clone(),
        )
        .await;

        if !state.try_commit(result.final_size) {
            debug!(
                %key,
                size = result.final_size,
                used = state.used,
                budget,
                "inline budget exhausted"
            );
            out.skipped.push(image.clone());
            out.dispositions.push((key, Disposition::SkippedBudget));
            continue;
        }

        if result.was_converted {
            out.mime_overrides.insert(key.clone(), result.mime_type);
        }
        out.images.insert(key.clone(), result.data);
        out.dispositions.push((key, Disposition::Included));
    }

    out.total_bytes = state.used;
    debug!(
        included = out.images.len(),
        skipped = out.skipped.len(),
        failed = out.warnings.len(),
        total_bytes = out.total_bytes,
        budget,
        "budgeted image download finished"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::{png_stub, real_png, ref_with_url, StubDownloader};

    fn stub_with(files: &[(&str, Vec<u8>)]) -> StubDownloader {
        files
            .iter()
            .fold(StubDownloader::new(), |stub, (url, data)| stub.with_file(url, data.clone()))
    }

    async fn run(
        stub: &StubDownloader,
        images: &[ImageReference],
        settings: &ImageSettings,
        budget: u64,
    ) -> BudgetedDownload {
        fetch_within_budget(stub, images, settings, budget, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn everything_fits() {
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(100)),
            ("https://files.slack.com/2", png_stub(200)),
        ]);
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
        ];

        let result = run(&stub, &images, &ImageSettings::default(), 1_000).await;
        assert_eq!(result.images.len(), 2);
        assert!(result.skipped.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.total_bytes, 300);
    }

    #[tokio::test]
    async fn budget_trips_after_first_image() {
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(1000)),
            ("https://files.slack.com/2", png_stub(1000)),
            ("https://files.slack.com/3", png_stub(1000)),
        ]);
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
            ref_with_url("F3", "https://files.slack.com/3"),
        ];

        let result = run(&stub, &images, &ImageSettings::default(), 1_500).await;
        assert_eq!(result.images.len(), 1);
        assert!(result.images.contains_key(&ImageKey::File("F1".to_string())));
        assert_eq!(result.skipped.len(), 2);
        assert!(result.warnings.is_empty());
        // The third reference is never fetched once the flag is set.
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn oversized_first_image_blocks_everything_after_it() {
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(2000)),
            ("https://files.slack.com/2", png_stub(500)),
        ]);
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
        ];

        let result = run(&stub, &images, &ImageSettings::default(), 1_000).await;
        assert!(result.images.is_empty());
        assert_eq!(result.skipped.len(), 2);
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.dispositions,
            vec![
                (ImageKey::File("F1".to_string()), Disposition::SkippedBudget),
                (ImageKey::File("F2".to_string()), Disposition::SkippedBudget),
            ]
        );
    }

    #[tokio::test]
    async fn size_ceiling_warns_without_tripping_budget() {
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(2000)),
            ("https://files.slack.com/2", png_stub(500)),
        ]);
        let mut first = ref_with_url("F1", "https://files.slack.com/1");
        first.size = 2000;
        let images = vec![first, ref_with_url("F2", "https://files.slack.com/2")];

        let mut settings = ImageSettings::default();
        settings.max_image_bytes = 1_000;
        let result = run(&stub, &images, &settings, 10_000).await;

        assert_eq!(result.images.len(), 1);
        assert!(result.images.contains_key(&ImageKey::File("F2".to_string())));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("exceeds limit"));
        assert_eq!(result.dispositions[0].1, Disposition::SkippedTooLarge);
        assert!(result.skipped.is_empty());
    }

    #[tokio::test]
    async fn fetch_errors_do_not_trip_budget() {
        let stub = stub_with(&[("https://files.slack.com/2", png_stub(100))]);
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/missing"),
            ref_with_url("F2", "https://files.slack.com/2"),
        ];

        let result = run(&stub, &images, &ImageSettings::default(), 1_000).await;
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Skipped image: failed to download image"));
        assert_eq!(result.dispositions[0].1, Disposition::SkippedError);
    }

    #[tokio::test]
    async fn flag_stays_set_for_small_later_images() {
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(400)),
            ("https://files.slack.com/2", png_stub(700)),
            ("https://files.slack.com/3", png_stub(10)),
        ]);
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
            ref_with_url("F3", "https://files.slack.com/3"),
        ];

        let result = run(&stub, &images, &ImageSettings::default(), 1_000).await;
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.dispositions[2].1, Disposition::SkippedBudget);
        assert!(result.total_bytes <= 1_000);
    }

    #[tokio::test]
    async fn cancellation_keeps_images_already_included() {
        let cancel = CancellationToken::new();
        let stub = stub_with(&[
            ("https://files.slack.com/1", png_stub(100)),
            ("https://files.slack.com/2", png_stub(100)),
        ])
        .cancel_after(1, cancel.clone());
        let images = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
        ];

        let result =
            fetch_within_budget(&stub, &images, &ImageSettings::default(), 1_000, &cancel).await;
        assert!(cancel.is_cancelled());
        assert_eq!(result.images.len(), 1);
        assert!(result.images.contains_key(&ImageKey::File("F1".to_string())));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("cancelled"));
        assert_eq!(
            result.dispositions,
            vec![
                (ImageKey::File("F1".to_string()), Disposition::Included),
                (ImageKey::File("F2".to_string()), Disposition::SkippedError),
            ]
        );
        assert_eq!(stub.calls(), 1);
        assert_eq!(result.total_bytes, 100);
    }

    #[tokio::test]
    async fn transcoded_png_records_mime_override() {
        let stub = stub_with(&[("https://files.slack.com/1", real_png(32, 32))]);
        let images = vec![ref_with_url("F1", "https://files.slack.com/1")];

        let result = run(&stub, &images, &ImageSettings::default(), 750 * 1024).await;
        let key = ImageKey::File("F1".to_string());
        assert_eq!(result.mime_overrides.get(&key).map(String::as_str), Some("image/jpeg"));
        assert_eq!(result.total_bytes, result.images[&key].len() as u64);
    }

    #[tokio::test]
    async fn reference_without_id_is_keyed_by_url() {
        let url = "https://files.slack.com/files/preview.png";
        let stub = stub_with(&[(url, png_stub(64))]);
        let images = vec![ref_with_url("", url)];

        let result = run(&stub, &images, &ImageSettings::default(), 1_000).await;
        assert!(result.images.contains_key(&ImageKey::Url(url.to_string())));
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let stub = StubDownloader::new();
        let result = run(&stub, &[], &ImageSettings::default(), 1_000).await;
        assert!(result.images.is_empty());
        assert!(result.warnings.is_empty());
        assert!(result.dispositions.is_empty());
    }
}
