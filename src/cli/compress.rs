use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::CompressOpts;
use crate::media::compress::compress_png_to_jpeg;

/// Sizes for one transcoded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressReport {
    pub name: String,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl CompressReport {
    fn line(&self, quality: u8) -> String {
        format!(
            "{}: {} -> {} ({:.0}% reduction) @ quality {quality}",
            self.name,
            format_bytes(self.original_size),
            format_bytes(self.compressed_size),
            reduction(self.original_size, self.compressed_size),
        )
    }
}

pub fn run_compress(opts: &CompressOpts) -> Result<Vec<CompressReport>> {
    let files = collect_pngs(&opts.input)?;
    let output_dir = match &opts.output {
        Some(dir) => dir.clone(),
        None if opts.input.is_dir() => opts.input.clone(),
        None => opts
            .input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Error creating output directory '{}'", output_dir.display()))?;

    let mut reports = Vec::new();
    for file in &files {
        match compress_file(file, &output_dir, opts.quality) {
            Ok(report) => {
                println!("{}", report.line(opts.quality));
                reports.push(report);
            }
            Err(err) => {
                warn!(file = %file.display(), error = %err, "compression failed");
                eprintln!("Error processing {}: {err:#}", display_name(file));
            }
        }
    }

    if files.len() > 1 {
        let original: u64 = reports.iter().map(|r| r.original_size).sum();
        let compressed: u64 = reports.iter().map(|r| r.compressed_size).sum();
        println!(
            "\nTotal: {} -> {} ({:.0}% reduction)",
            format_bytes(original),
            format_bytes(compressed),
            reduction(original, compressed),
        );
    }

    Ok(reports)
}

fn collect_pngs(input: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(input)
        .with_context(|| format!("Error accessing input path '{}'", input.display()))?;

    if !metadata.is_dir() {
        if !is_png(input) {
            bail!("input file must be a PNG");
        }
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(input).context("Error reading directory")? {
        let path = entry?.path();
        if path.is_file() && is_png(&path) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("No PNG files found in input directory");
    }
    Ok(files)
}

fn compress_file(input: &Path, output_dir: &Path, quality: u8) -> Result<CompressReport> {
    let data = std::fs::read(input).context("failed to read input file")?;
    let jpeg = compress_png_to_jpeg(&data, quality)?;

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let output = output_dir.join(format!("{stem}.jpg"));
    std::fs::write(&output, &jpeg).context("failed to create output file")?;

    Ok(CompressReport {
        name: display_name(input),
        original_size: data.len() as u64,
        compressed_size: jpeg.len() as u64,
    })
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn reduction(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    100.0 - (compressed as f64 / original as f64 * 100.0)
}

/// Human-readable byte count: `512B`, `12KB`, `3.4MB`, `1.0GB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b >= GB => format!("{:.1}GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.0}KB", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::real_png;
    use tempfile::TempDir;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1023), "1023B");
        assert_eq!(format_bytes(1024), "1KB");
        assert_eq!(format_bytes(10 * 1024), "10KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 400 * 1024), "3.4MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.0GB");
    }

    #[test]
    fn report_line_matches_format() {
        let report = CompressReport {
            name: "shot.png".to_string(),
            original_size: 4096,
            compressed_size: 1024,
        };
        assert_eq!(report.line(60), "shot.png: 4KB -> 1KB (75% reduction) @ quality 60");
    }

    #[test]
    fn compresses_directory_of_pngs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.png"), real_png(32, 32)).unwrap();
        std::fs::write(dir.path().join("b.PNG"), real_png(16, 16)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        let out = dir.path().join("out");

        let reports = run_compress(&CompressOpts {
            input: dir.path().to_path_buf(),
            quality: 70,
            output: Some(out.clone()),
        })
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(out.join("a.jpg").exists());
        assert!(out.join("b.jpg").exists());
    }

    #[test]
    fn rejects_non_png_and_empty_directories() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello").unwrap();

        let err = run_compress(&CompressOpts {
            input: text,
            quality: 80,
            output: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("must be a PNG"));

        let empty = TempDir::new().unwrap();
        let err = run_compress(&CompressOpts {
            input: empty.path().to_path_buf(),
            quality: 80,
            output: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("No PNG files"));
    }
}
