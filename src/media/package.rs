use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Serialize, Serializer};

use super::reference::{ImageKey, ImageReference};

/// One image ready for the response layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub mime_type: String,
    #[serde(serialize_with = "as_base64")]
    pub data: Bytes,
}

impl ImageContent {
    /// File extension matching the MIME type, for writing to disk.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

fn as_base64<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

/// Emit included images in reference order, applying MIME overrides.
pub fn package(
    references: &[ImageReference],
    images: &HashMap<ImageKey, Bytes>,
    mime_overrides: &HashMap<ImageKey, String>,
) -> Vec<ImageContent> {
    references
        .iter()
        .filter_map(|reference| {
            let key = reference.key();
            let data = images.get(&key)?.clone();
            let mime_type = mime_overrides
                .get(&key)
                .cloned()
                .unwrap_or_else(|| reference.mime_type.clone());
            Some(ImageContent { mime_type, data })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::ref_with_url;
    use pretty_assertions::assert_eq;

    #[test]
    fn packages_in_reference_order_with_overrides() {
        let refs = vec![
            ref_with_url("F1", "https://files.slack.com/1"),
            ref_with_url("F2", "https://files.slack.com/2"),
            ref_with_url("", "https://files.slack.com/3"),
        ];
        let mut images = HashMap::new();
        images.insert(ImageKey::Url("https://files.slack.com/3".to_string()), Bytes::from_static(b"three"));
        images.insert(ImageKey::File("F1".to_string()), Bytes::from_static(b"one"));
        let mut overrides = HashMap::new();
        overrides.insert(ImageKey::File("F1".to_string()), "image/jpeg".to_string());

        let content = package(&refs, &images, &overrides);
        assert_eq!(
            content,
            vec![
                ImageContent {
                    mime_type: "image/jpeg".to_string(),
                    data: Bytes::from_static(b"one"),
                },
                ImageContent {
                    mime_type: "image/png".to_string(),
                    data: Bytes::from_static(b"three"),
                },
            ]
        );
    }

    #[test]
    fn serializes_data_as_base64() {
        let content = ImageContent {
            mime_type: "image/png".to_string(),
            data: Bytes::from_static(b"hello"),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["mimeType"], "image/png");
        assert_eq!(json["data"], "aGVsbG8=");
        assert_eq!(content.extension(), "png");
    }
}
