use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{format_bytes, DeliverOpts};
use crate::channels::slack::{parse_messages, SlackClient};
use crate::config::{read_bounded, Config};
use crate::media::{Delivery, DeliveryMode, ImageContent, ImagePipeline, ImageSettings};

/// Largest message dump accepted on input.
const MAX_MESSAGES_FILE_BYTES: u64 = 64 * 1024 * 1024;

pub async fn run_deliver(config: &Config, opts: &DeliverOpts) -> Result<Delivery> {
    let settings = ImageSettings::from_config(&config.images);
    let client = SlackClient::from_config(&config.slack, settings.allowlist.clone())?
        .with_download_limit(settings.max_image_bytes);

    let raw = read_bounded(&opts.messages, MAX_MESSAGES_FILE_BYTES)?;
    let messages = parse_messages(&raw)
        .with_context(|| format!("Failed to parse '{}'", opts.messages.display()))?;

    let pipeline = ImagePipeline::new(settings, Arc::new(client));
    let references = pipeline.references(&messages);
    info!(
        messages = messages.len(),
        references = references.len(),
        "image references located"
    );

    let mode = if opts.pooled {
        DeliveryMode::Pooled
    } else {
        opts.budget
            .map(DeliveryMode::Budgeted)
            .unwrap_or_else(|| pipeline.default_mode())
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    let delivery = pipeline.deliver(&references, mode, cancel).await;
    interrupt.abort();

    for (key, disposition) in &delivery.dispositions {
        debug!(%key, ?disposition, "reference disposition");
    }
    for warning in &delivery.warnings {
        eprintln!("{warning}");
    }
    for image in &delivery.skipped {
        let id = image.file_id.as_deref().unwrap_or(&image.url);
        eprintln!(
            "Not included (over budget): {} ({id}); fetch it with `imagegate get-image`",
            image.name
        );
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&delivery.content)?);
    } else if let Some(dir) = &opts.output {
        write_images(dir, &delivery.content)?;
    } else {
        for (i, content) in delivery.content.iter().enumerate() {
            println!("#{} {} {} bytes", i + 1, content.mime_type, content.data.len());
        }
        println!("Total: {} in {} image(s)", format_bytes(delivery.total_bytes), delivery.content.len());
    }

    Ok(delivery)
}

/// Write images as `image-01.jpg`, `image-02.png`, ... in delivery order.
pub(crate) fn write_images(dir: &Path, content: &[ImageContent]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Error creating output directory '{}'", dir.display()))?;

    for (i, image) in content.iter().enumerate() {
        let path = dir.join(format!("image-{:02}.{}", i + 1, image.extension()));
        std::fs::write(&path, &image.data)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}
