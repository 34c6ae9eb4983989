//! Feedback payloads returned by interface backends and handed to the agent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

/// Feedback submitted by a human through an interface backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_logs: Option<String>,
    /// Attachments in the order the user submitted them.
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

impl FeedbackResult {
    /// Free-text feedback, if any non-empty text was given.
    pub fn feedback_text(&self) -> Option<&str> {
        self.interactive_feedback.as_deref().filter(|s| !s.is_empty())
    }

    /// Command logs, if any non-empty logs were captured.
    pub fn logs_text(&self) -> Option<&str> {
        self.command_logs.as_deref().filter(|s| !s.is_empty())
    }

    /// True when the result carries no text, logs or images.
    pub fn is_empty(&self) -> bool {
        self.feedback_text().is_none() && self.logs_text().is_none() && self.images.is_empty()
    }
}

/// An image attached to a feedback result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(default = "default_image_name")]
    pub name: String,
    /// Size in bytes as reported by the submitter.
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ImagePayload>,
}

fn default_image_name() -> String {
    "image.png".to_string()
}

impl ImageAttachment {
    /// Build an attachment from raw bytes, deriving the size from the payload.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            data: Some(ImagePayload::Binary(bytes)),
        }
    }

    /// Build an attachment from base64 text.
    pub fn from_base64(name: impl Into<String>, size: u64, encoded: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            data: Some(ImagePayload::Base64(encoded.into())),
        }
    }

    /// Format inferred from the file name suffix.
    pub fn format(&self) -> ImageFormat {
        ImageFormat::from_name(&self.name)
    }
}

/// In-memory image payload.
///
/// Backends may hand us raw bytes or base64 text. Anything else seen at the
/// JSON boundary is kept verbatim so decoding can reject it per attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagePayload {
    Base64(String),
    Binary(Vec<u8>),
    Unsupported(serde_json::Value),
}

/// Image encoding inferred from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// `.jpg`/`.jpeg` is jpeg, `.gif` is gif, everything else png.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Self::Jpeg
        } else if lower.ends_with(".gif") {
            Self::Gif
        } else {
            Self::Png
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
        }
    }
}

/// A normalized content item returned to the agent host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        format: ImageFormat,
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of a text item, `None` for images.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

mod base64_bytes {
    use super::{BASE64_STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_name() {
        assert_eq!(ImageFormat::from_name("shot.PNG"), ImageFormat::Png);
        assert_eq!(ImageFormat::from_name("photo.JPG"), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_name("photo.jpeg"), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_name("anim.Gif"), ImageFormat::Gif);
        assert_eq!(ImageFormat::from_name("diagram.webp"), ImageFormat::Png);
        assert_eq!(ImageFormat::from_name("noext"), ImageFormat::Png);
    }

    #[test]
    fn test_payload_from_json_boundary() {
        let json = r#"{
            "interactive_feedback": "looks good",
            "images": [
                {"name": "a.png", "size": 3, "data": "AAEC"},
                {"name": "b.png", "size": 2, "data": [1, 2]},
                {"name": "c.png", "size": 0, "data": {"weird": true}},
                {"name": "d.png", "size": 0}
            ]
        }"#;
        let result: FeedbackResult = serde_json::from_str(json).unwrap();

        assert_eq!(result.feedback_text(), Some("looks good"));
        assert_eq!(result.images.len(), 4);
        assert_eq!(result.images[0].data, Some(ImagePayload::Base64("AAEC".into())));
        assert_eq!(result.images[1].data, Some(ImagePayload::Binary(vec![1, 2])));
        assert!(matches!(result.images[2].data, Some(ImagePayload::Unsupported(_))));
        assert!(result.images[3].data.is_none());
    }

    #[test]
    fn test_empty_result() {
        let result = FeedbackResult {
            interactive_feedback: Some(String::new()),
            command_logs: None,
            images: Vec::new(),
        };
        assert!(result.is_empty());
    }

    #[test]
    fn test_image_content_serializes_as_base64() {
        let item = ContentItem::Image {
            data: vec![0, 1, 2],
            format: ImageFormat::Png,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["data"], "AAEC");
        assert_eq!(json["format"], "png");
    }
}
