use super::Config;
use anyhow::Result;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    let images = &config.images;

    let positive = [
        ("images.maxImageBytes", images.max_image_bytes),
        ("images.maxImagesPerCall", images.max_images_per_call as u64),
        ("images.downloadTimeoutSecs", images.download_timeout_secs),
        ("images.maxConcurrentDownloads", images.max_concurrent_downloads as u64),
        ("images.inlineBudgetBytes", images.inline_budget_bytes),
    ];
    for (path, value) in positive {
        if value == 0 {
            errors.push(ConfigValidationError::new(path, "Must be greater than 0"));
        }
    }

    validate_qualities(&images.jpeg_qualities, &mut errors);
    validate_hosts(&images.allowed_hosts, &mut errors);

    if images.inline_budget_bytes
        > images
            .max_image_bytes
            .saturating_mul(images.max_images_per_call as u64)
    {
        warn!("images.inlineBudgetBytes is larger than any batch can use");
    }

    let api_base = config.slack.api_base.trim();
    if url::Url::parse(api_base).is_err() {
        errors.push(ConfigValidationError::new(
            "slack.apiBase",
            format!("Invalid URL '{api_base}'"),
        ));
    }

    errors
}

fn validate_qualities(qualities: &[u8], errors: &mut Vec<ConfigValidationError>) {
    if qualities.is_empty() {
        errors.push(ConfigValidationError::new(
            "images.jpegQualities",
            "At least one JPEG quality is required",
        ));
        return;
    }

    for (i, quality) in qualities.iter().enumerate() {
        if !(1..=100).contains(quality) {
            errors.push(ConfigValidationError::new(
                format!("images.jpegQualities[{i}]"),
                format!("Quality {quality} is outside 1..=100"),
            ));
        }
    }

    if qualities.windows(2).any(|pair| pair[0] <= pair[1]) {
        errors.push(ConfigValidationError::new(
            "images.jpegQualities",
            "Qualities must be strictly descending",
        ));
    }
}

fn validate_hosts(hosts: &[String], errors: &mut Vec<ConfigValidationError>) {
    if hosts.is_empty() {
        errors.push(ConfigValidationError::new(
            "images.allowedHosts",
            "At least one allowed host is required",
        ));
        return;
    }

    for (i, host) in hosts.iter().enumerate() {
        let host = host.trim();
        let malformed = host.contains(['/', ':', '?', '#', '@']) || host.contains(char::is_whitespace);
        if host.is_empty() || malformed {
            errors.push(ConfigValidationError::new(
                format!("images.allowedHosts[{i}]"),
                format!("'{host}' must be a bare hostname (no scheme, port or path)"),
            ));
        }
    }
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
