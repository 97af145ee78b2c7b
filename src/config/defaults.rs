/// Default configuration constants for the image pipeline.

/// Hard per-image ceiling (3.75 MiB). Base64 inflates by 4/3, so this stays
/// under a 5 MiB transport limit once encoded.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 3_932_160;

/// Maximum references processed per call; extras are truncated.
pub const DEFAULT_MAX_IMAGES_PER_CALL: usize = 10;

/// Per-fetch timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Worker pool size for pooled delivery.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Inline response budget (750 KiB of raw image bytes).
pub const DEFAULT_INLINE_BUDGET_BYTES: u64 = 750 * 1024;

/// JPEG quality ladder, highest first.
pub const DEFAULT_JPEG_QUALITIES: [u8; 3] = [80, 60, 40];

/// Slack Web API base URL.
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

/// Default config file name written by `config init`.
pub const DEFAULT_CONFIG_FILE: &str = "imagegate.json";
