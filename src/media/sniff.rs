//! Content-type classification.
//!
//! Declared MIME types and URL extensions are only hints; the bytes that come
//! back from the transport are classified by their magic signature. When the
//! signature check fails we look for HTML so that a login page served in
//! place of the file is reported as an authentication failure.

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use super::error::ImageError;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Payloads shorter than this are never classified as images.
const MIN_IMAGE_BYTES: usize = 8;
const HTML_MIN_BYTES: usize = 15;
const HTML_HEAD_SCAN: usize = 500;
const HTML_TAIL_SCAN: usize = 20;
const HTML_OPENING_MARKERS: &[&str] = &["<!doctype", "<html", "<head", "<body"];
const HTML_CLOSING_MARKERS: &[&str] = &["</html>", "</body>"];

/// Image formats the pipeline delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Normalize a declared MIME type and map it to a supported format.
    ///
    /// Whitespace and parameters after `;` are dropped and the comparison is
    /// case-insensitive, so `" IMAGE/PNG ; charset=utf-8"` is PNG. Structured
    /// suffixes are not stripped: `image/png+xml` is not PNG.
    pub fn from_mime(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or_default().trim();
        if essence.is_empty() {
            return None;
        }
        let parsed: mime::Mime = essence.to_ascii_lowercase().parse().ok()?;
        if parsed.type_() != mime::IMAGE || parsed.suffix().is_some() {
            return None;
        }
        let subtype = parsed.subtype();
        if subtype == mime::PNG {
            Some(Self::Png)
        } else if subtype == mime::JPEG {
            Some(Self::Jpeg)
        } else if subtype == mime::GIF {
            Some(Self::Gif)
        } else if subtype.as_str() == "webp" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// Classify raw bytes by magic signature.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_IMAGE_BYTES {
            return None;
        }
        if data.starts_with(&PNG_SIGNATURE) {
            return Some(Self::Png);
        }
        if data.starts_with(&JPEG_SIGNATURE) {
            return Some(Self::Jpeg);
        }
        if data.starts_with(b"GIF") {
            return Some(Self::Gif);
        }
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }
        None
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// True when the declared MIME type is one the pipeline can deliver.
pub fn is_supported_mime(declared: &str) -> bool {
    ImageFormat::from_mime(declared).is_some()
}

/// Heuristic check for an HTML document (typically an auth redirect page).
pub fn looks_like_html(data: &[u8]) -> bool {
    if data.len() < HTML_MIN_BYTES {
        return false;
    }

    let head = String::from_utf8_lossy(&data[..data.len().min(HTML_HEAD_SCAN)]).to_lowercase();
    if HTML_OPENING_MARKERS.iter().any(|m| head.contains(m)) {
        return true;
    }

    if data.len() > HTML_TAIL_SCAN {
        let tail = String::from_utf8_lossy(&data[data.len() - HTML_TAIL_SCAN..]).to_lowercase();
        if HTML_CLOSING_MARKERS.iter().any(|m| tail.contains(m)) {
            return true;
        }
    }

    false
}

/// Validate downloaded bytes, distinguishing an auth failure page from
/// generic garbage.
pub fn classify_payload(data: &[u8]) -> Result<ImageFormat, ImageError> {
    if let Some(format) = ImageFormat::sniff(data) {
        return Ok(format);
    }
    if looks_like_html(data) {
        Err(ImageError::AuthFailureDetected)
    } else {
        Err(ImageError::ContentFormatInvalid)
    }
}

/// Guess an image format from the file extension in a URL path.
///
/// Unknown or missing extensions default to PNG, which is what Slack
/// screenshots usually are. Returns `None` only if the URL cannot be parsed.
pub fn guess_format_from_url(raw_url: &str) -> Option<ImageFormat> {
    let url = Url::parse(raw_url).ok()?;
    let path = url.path().to_ascii_lowercase();
    let format = if path.ends_with(".png") {
        ImageFormat::Png
    } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
        ImageFormat::Jpeg
    } else if path.ends_with(".gif") {
        ImageFormat::Gif
    } else if path.ends_with(".webp") {
        ImageFormat::Webp
    } else {
        ImageFormat::Png
    };
    Some(format)
}

/// Last path segment of a URL, percent-decoded, or `"image"` when there is none.
pub fn filename_from_url(raw_url: &str) -> String {
    Url::parse(raw_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image".to_string())
}
