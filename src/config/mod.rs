mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level imagegate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(find_config_file);

        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                read_config_file(&path)?
            }
            Some(path) => {
                anyhow::bail!("Config file '{}' does not exist", path.display());
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &Path) -> Result<()> {
        write_config_file(path, &Config::default())
    }

    /// Copy of the configuration that is safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let Some(token) = config.slack.token.as_mut() {
            let prefix: String = token.chars().take(5).collect();
            *token = format!("{prefix}***");
        }
        config
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env("SLACK_BOT_TOKEN").or_else(|| env("SLACK_USER_TOKEN")) {
            self.slack.apply_token(&token);
        }

        if let Some(base) = env("IMAGEGATE_SLACK_API_BASE") {
            self.slack.api_base = base;
        }

        override_number(&env, "IMAGEGATE_INLINE_BUDGET", &mut self.images.inline_budget_bytes);
        override_number(&env, "IMAGEGATE_MAX_IMAGE_BYTES", &mut self.images.max_image_bytes);
        override_number(
            &env,
            "IMAGEGATE_DOWNLOAD_TIMEOUT_SECS",
            &mut self.images.download_timeout_secs,
        );
        override_number(
            &env,
            "IMAGEGATE_MAX_CONCURRENT_DOWNLOADS",
            &mut self.images.max_concurrent_downloads,
        );
    }
}

fn override_number<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = env(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("Ignoring {key}: '{raw}' is not a valid number"),
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("imagegate.json"),
        PathBuf::from("imagegate.yaml"),
        PathBuf::from("imagegate.yml"),
        PathBuf::from("imagegate.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".imagegate").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}
