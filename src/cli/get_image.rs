use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::GetImageOpts;
use crate::channels::slack::SlackClient;
use crate::config::Config;
use crate::media::retrieve::{retrieve_image, RetrievedImage};
use crate::media::ImageSettings;

pub async fn run_get_image(config: &Config, opts: &GetImageOpts) -> Result<RetrievedImage> {
    let settings = ImageSettings::from_config(&config.images);
    let client = SlackClient::from_config(&config.slack, settings.allowlist.clone())?
        .with_download_limit(settings.max_image_bytes);

    let image = retrieve_image(
        &opts.file_id,
        &client,
        &client,
        &settings,
        &CancellationToken::new(),
    )
    .await?;

    println!("{}", image.summary());
    if let Some(path) = &opts.output {
        std::fs::write(path, &image.content.data)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        println!("Saved to {}", path.display());
    }

    Ok(image)
}
