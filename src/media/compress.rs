//! PNG to JPEG transcoding against a byte budget.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use tracing::{debug, warn};

use super::error::ImageError;
use super::sniff::ImageFormat;

/// Outcome of [`compress_to_budget`]. Derived only from its inputs.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub original_size: u64,
    pub data: Bytes,
    pub mime_type: String,
    pub was_converted: bool,
    pub final_size: u64,
    /// JPEG quality that produced `data`, when transcoded.
    pub quality: Option<u8>,
}

impl CompressionResult {
    fn unchanged(data: &[u8], mime_type: &str) -> Self {
        Self::passthrough(Bytes::copy_from_slice(data), mime_type.to_string())
    }

    fn passthrough(data: Bytes, mime_type: String) -> Self {
        let len = data.len() as u64;
        Self {
            original_size: len,
            data,
            mime_type,
            was_converted: false,
            final_size: len,
            quality: None,
        }
    }
}

/// Re-encode a PNG as JPEG at a single quality.
pub fn compress_png_to_jpeg(data: &[u8], quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = decode_png(data)?;
    encode_jpeg(&rgb, quality)
}

/// Fit an image into `budget` bytes.
///
/// Non-PNG input is returned unchanged. PNG input is always transcoded, walking
/// `qualities` from highest to lowest and stopping at the first encoding that
/// fits; the lowest quality is accepted even when it does not fit. If the PNG
/// cannot be decoded, or the lowest quality fails to encode, the original
/// bytes come back untouched.
pub fn compress_to_budget(
    data: &[u8],
    mime_type: &str,
    budget: u64,
    qualities: &[u8],
) -> CompressionResult {
    if ImageFormat::from_mime(mime_type) != Some(ImageFormat::Png) || qualities.is_empty() {
        return CompressionResult::unchanged(data, mime_type);
    }

    let rgb = match decode_png(data) {
        Ok(rgb) => rgb,
        Err(err) => {
            debug!(error = %err, "PNG decode failed, keeping original bytes");
            return CompressionResult::unchanged(data, mime_type);
        }
    };

    match walk_ladder(qualities, budget, |quality| encode_jpeg(&rgb, quality)) {
        Some((quality, encoded)) => converted(data.len() as u64, encoded, quality),
        None => CompressionResult::unchanged(data, mime_type),
    }
}

/// Try each quality in turn and keep the first encoding within `budget`.
/// The last rung is accepted regardless of size; `None` when it fails to
/// encode.
fn walk_ladder<F>(qualities: &[u8], budget: u64, mut encode: F) -> Option<(u8, Vec<u8>)>
where
    F: FnMut(u8) -> Result<Vec<u8>, ImageError>,
{
    for (index, &quality) in qualities.iter().enumerate() {
        let last = index + 1 == qualities.len();
        let encoded = match encode(quality) {
            Ok(encoded) => encoded,
            Err(err) => {
                debug!(quality, error = %err, "JPEG encode failed");
                continue;
            }
        };

        let size = encoded.len() as u64;
        if size <= budget || last {
            debug!(final_size = size, quality, budget, "PNG transcoded to JPEG");
            return Some((quality, encoded));
        }
    }
    None
}

/// [`compress_to_budget`] on the blocking pool.
///
/// Decoding and re-encoding a large PNG takes long enough to stall a runtime
/// worker, so async callers go through here. Non-PNG input skips the hop.
pub async fn compress_to_budget_blocking(
    data: Bytes,
    mime_type: String,
    budget: u64,
    qualities: Vec<u8>,
) -> CompressionResult {
    if ImageFormat::from_mime(&mime_type) != Some(ImageFormat::Png) || qualities.is_empty() {
        return CompressionResult::passthrough(data, mime_type);
    }

    let input = data.clone();
    let declared = mime_type.clone();
    match tokio::task::spawn_blocking(move || {
        compress_to_budget(&input, &declared, budget, &qualities)
    })
    .await
    {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, "compression task failed, keeping original bytes");
            CompressionResult::passthrough(data, mime_type)
        }
    }
}

fn converted(original_size: u64, encoded: Vec<u8>, quality: u8) -> CompressionResult {
    let final_size = encoded.len() as u64;
    CompressionResult {
        original_size,
        data: Bytes::from(encoded),
        mime_type: ImageFormat::Jpeg.mime_type().to_string(),
        was_converted: true,
        final_size,
        quality: Some(quality),
    }
}

fn decode_png(data: &[u8]) -> Result<RgbImage, ImageError> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Png)
        .map_err(|e| ImageError::CompressionFailed(format!("failed to decode PNG: {e}")))?;
    Ok(match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(rgb)
        .map_err(|e| ImageError::CompressionFailed(format!("failed to encode JPEG: {e}")))?;
    Ok(out.into_inner())
}
