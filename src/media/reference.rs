//! Locating image references in Slack messages.
//!
//! Pure functions: nothing here touches the network. Output order mirrors
//! input order and duplicates are kept.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::host::HostAllowlist;
use super::sniff::{filename_from_url, guess_format_from_url, is_supported_mime};
use crate::channels::slack::{SlackAttachment, SlackMessage};

/// One image candidate found in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    /// Slack file ID; `None` for link-preview attachments.
    pub file_id: Option<String>,
    pub name: String,
    /// Declared MIME type, as reported by Slack or guessed from the URL.
    pub mime_type: String,
    /// Declared size in bytes, 0 when unknown.
    pub size: u64,
    /// Never empty; references without a usable URL are dropped.
    pub url: String,
    /// Timestamp of the owning message, for display only.
    pub message_ts: String,
}

impl ImageReference {
    pub fn key(&self) -> ImageKey {
        match self.file_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => ImageKey::File(id.to_string()),
            None => ImageKey::Url(self.url.clone()),
        }
    }

    /// Declared size, when the source reported one.
    pub fn declared_size(&self) -> Option<u64> {
        (self.size > 0).then_some(self.size)
    }
}

/// Canonical lookup key for a reference within one invocation.
///
/// File IDs and URLs live in separate namespaces so an ID can never collide
/// with another reference's URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageKey {
    File(String),
    Url(String),
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(id) => write!(f, "file:{id}"),
            Self::Url(url) => write!(f, "url:{url}"),
        }
    }
}

/// Image files attached directly to a message.
pub fn images_from_message(message: &SlackMessage) -> Vec<ImageReference> {
    message
        .files
        .iter()
        .filter(|file| is_supported_mime(&file.mimetype))
        .filter_map(|file| {
            let url = file.download_url()?;
            Some(ImageReference {
                file_id: Some(file.id.clone()).filter(|id| !id.is_empty()),
                name: file.name.clone(),
                mime_type: file.mimetype.clone(),
                size: file.size,
                url: url.to_string(),
                message_ts: message.ts.clone(),
            })
        })
        .collect()
}

/// Images from link-preview attachments, restricted to allowed hosts.
///
/// The full-size `image_url` wins; `thumb_url` is used only when the
/// full-size URL is missing or points at a host we refuse to fetch from.
pub fn images_from_attachments(
    attachments: &[SlackAttachment],
    message_ts: &str,
    allowlist: &HostAllowlist,
) -> Vec<ImageReference> {
    let mut images = Vec::new();

    for attachment in attachments {
        let full = non_empty(attachment.image_url.as_deref()).filter(|url| allowlist.allows(url));
        let thumb = non_empty(attachment.thumb_url.as_deref()).filter(|url| allowlist.allows(url));

        if let Some(url) = full.or(thumb) {
            if let Some(reference) = preview_reference(url, message_ts) {
                images.push(reference);
            }
        }
    }

    images
}

/// All image references for a message: files first, then previews.
pub fn images_from_slack_message(
    message: &SlackMessage,
    allowlist: &HostAllowlist,
) -> Vec<ImageReference> {
    let mut images = images_from_message(message);
    images.extend(images_from_attachments(
        &message.attachments,
        &message.ts,
        allowlist,
    ));
    images
}

fn preview_reference(url: &str, message_ts: &str) -> Option<ImageReference> {
    let format = guess_format_from_url(url)?;
    Some(ImageReference {
        file_id: None,
        name: filename_from_url(url),
        mime_type: format.mime_type().to_string(),
        size: 0,
        url: url.to_string(),
        message_ts: message_ts.to_string(),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
