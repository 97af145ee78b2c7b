use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::media::host::DEFAULT_ALLOWED_HOSTS;

// ============================================================================
// Images
// ============================================================================

/// Limits for image delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesConfig {
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
    #[serde(default = "default_max_images_per_call")]
    pub max_images_per_call: usize,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_inline_budget_bytes")]
    pub inline_budget_bytes: u64,
    #[serde(default = "default_jpeg_qualities")]
    pub jpeg_qualities: Vec<u8>,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: default_max_image_bytes(),
            max_images_per_call: default_max_images_per_call(),
            download_timeout_secs: default_download_timeout_secs(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            inline_budget_bytes: default_inline_budget_bytes(),
            jpeg_qualities: default_jpeg_qualities(),
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

// ============================================================================
// Slack
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot (`xoxb-`) or user (`xoxp-`) token. Usually supplied via env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

impl SlackConfig {
    pub fn apply_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_slack_api_base(),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LoggingLevel,
    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_max_image_bytes() -> u64 {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_max_images_per_call() -> usize {
    DEFAULT_MAX_IMAGES_PER_CALL
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

fn default_inline_budget_bytes() -> u64 {
    DEFAULT_INLINE_BUDGET_BYTES
}

fn default_jpeg_qualities() -> Vec<u8> {
    DEFAULT_JPEG_QUALITIES.to_vec()
}

fn default_allowed_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_slack_api_base() -> String {
    DEFAULT_SLACK_API_BASE.to_string()
}
