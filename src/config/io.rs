use anyhow::{bail, Context, Result};
use std::path::Path;

use super::Config;

/// Maximum size for a config file (1 MB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;

/// Parse a JSON5 configuration string, retrying as strict JSON.
pub fn parse_config_json5(content: &str) -> Result<Config> {
    match json5::from_str(content) {
        Ok(config) => Ok(config),
        Err(json5_err) => serde_json::from_str(content).map_err(|_| json5_err.into()),
    }
}

/// Read a file, refusing symlinks at the final component and anything
/// larger than `limit` bytes.
pub fn read_bounded(path: &Path, limit: u64) -> Result<String> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Cannot stat '{}'", path.display()))?;

    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        bail!("'{}' is a symlink, refusing to follow", path.display());
    }

    if metadata.len() > limit {
        bail!(
            "'{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            limit,
        );
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

/// Read and parse a configuration file. The format follows the extension:
/// YAML, TOML, otherwise JSON5 (which accepts plain JSON).
pub fn read_config_file(path: &Path) -> Result<Config> {
    let content = read_bounded(path, MAX_CONFIG_FILE_BYTES)?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in '{}'", path.display())),
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in '{}'", path.display())),
        _ => parse_config_json5(&content)
            .with_context(|| format!("Invalid JSON in '{}'", path.display())),
    }
}

/// Write configuration to a JSON file.
pub fn write_config_file(path: &Path, config: &Config) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_json5_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("imagegate.json");
        fs::write(
            &file,
            r#"{
                // comments are allowed
                images: { inlineBudgetBytes: 500000, jpegQualities: [90, 70] },
            }"#,
        )
        .unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config.images.inline_budget_bytes, 500_000);
        assert_eq!(config.images.jpeg_qualities, vec![90, 70]);
        assert_eq!(config.images.max_images_per_call, 10);
    }

    #[test]
    fn read_yaml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("imagegate.yaml");
        fs::write(&file, "images:\n  maxConcurrentDownloads: 5\nlogging:\n  level: debug\n").unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config.images.max_concurrent_downloads, 5);
        assert_eq!(config.logging.level, crate::config::LoggingLevel::Debug);
    }

    #[test]
    fn read_toml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("imagegate.toml");
        fs::write(
            &file,
            "[images]\nallowedHosts = [\"files.slack.com\"]\n\n[slack]\napiBase = \"http://localhost:9000/api\"\n",
        )
        .unwrap();

        let config = read_config_file(&file).unwrap();
        assert_eq!(config.images.allowed_hosts, vec!["files.slack.com"]);
        assert_eq!(config.slack.api_base, "http://localhost:9000/api");
    }

    #[test]
    fn reject_oversized_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("huge.json");
        let content = "x".repeat((MAX_CONFIG_FILE_BYTES + 1) as usize);
        fs::write(&file, content).unwrap();

        let result = read_config_file(&file);
        assert!(result.unwrap_err().to_string().contains("exceeds limit"));
    }

    #[cfg(unix)]
    #[test]
    fn reject_symlinked_config() {
        let dir = TempDir::new().unwrap();
        let real_file = dir.path().join("real.json");
        let symlink = dir.path().join("link.json");
        fs::write(&real_file, "{}").unwrap();
        std::os::unix::fs::symlink(&real_file, &symlink).unwrap();

        let result = read_config_file(&symlink);
        assert!(result.unwrap_err().to_string().contains("symlink"));
    }

    #[test]
    fn written_config_reads_back() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("imagegate.json");
        let mut config = Config::default();
        config.images.inline_budget_bytes = 123_456;

        write_config_file(&file, &config).unwrap();
        let loaded = read_config_file(&file).unwrap();
        assert_eq!(loaded.images, config.images);
    }
}
