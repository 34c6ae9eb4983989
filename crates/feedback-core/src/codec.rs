//! Feedback normalization and the image encoding round trip.
//!
//! Backends return a [`FeedbackResult`] whose image payloads may be raw bytes
//! or base64 text. This module turns results into the ordered content items
//! handed back to the agent, and writes/reads the persisted JSON document in
//! which every image payload is base64 text tagged with `data_type`.

use crate::{CodecError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use feedback_types::{ContentItem, FeedbackResult, ImageAttachment, ImagePayload};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Text returned when a result carries nothing at all.
pub const NO_FEEDBACK_SENTINEL: &str = "User did not provide any feedback.";

/// Marker stored next to base64 image data in persisted documents.
pub const BASE64_DATA_TYPE: &str = "base64";

const PREVIEW_CHARS: usize = 50;
const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Options controlling the text summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Append the full base64 payload of each image as a data URL.
    pub include_full_base64: bool,
}

/// Normalize a feedback result into ordered content items.
///
/// Always yields exactly one text item first, followed by one image item per
/// attachment that decodes to non-empty bytes. Attachments that fail to
/// decode are dropped without affecting the rest.
pub fn normalize(result: &FeedbackResult, options: NormalizeOptions) -> Vec<ContentItem> {
    if result.is_empty() {
        debug!(target: "feedback::codec", "Feedback result is empty");
        return vec![ContentItem::text(NO_FEEDBACK_SENTINEL)];
    }

    let text = summary_text(result, options).unwrap_or_else(|| NO_FEEDBACK_SENTINEL.to_string());
    let mut items = vec![ContentItem::text(text)];

    for (index, image) in result.images.iter().enumerate() {
        match decode(image) {
            Ok(bytes) if bytes.is_empty() => {
                debug!(target: "feedback::codec", "Image {} ({}) is empty, skipping", index + 1, image.name);
            }
            Ok(bytes) => {
                debug!(
                    target: "feedback::codec",
                    "Image {} ({}) decoded: {} bytes, format {}",
                    index + 1,
                    image.name,
                    bytes.len(),
                    image.format().as_str()
                );
                items.push(ContentItem::Image {
                    data: bytes,
                    format: image.format(),
                });
            }
            Err(e) => {
                warn!(target: "feedback::codec", "Dropping image {} ({}): {}", index + 1, image.name, e);
            }
        }
    }

    items
}

/// Build the combined text section, or `None` when there is nothing to say.
pub fn summary_text(result: &FeedbackResult, options: NormalizeOptions) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(text) = result.feedback_text() {
        parts.push(format!("=== User Feedback ===\n{}", text));
    }

    if let Some(logs) = result.logs_text() {
        parts.push(format!("=== Command Logs ===\n{}", logs));
    }

    if !result.images.is_empty() {
        parts.push(format!(
            "=== Image Attachments ===\nUser provided {} image(s):",
            result.images.len()
        ));
        for (index, image) in result.images.iter().enumerate() {
            parts.push(image_summary(index + 1, image, options));
        }
        parts.push(
            "Note: if the images cannot be displayed, their data is included in the Base64 information above."
                .to_string(),
        );
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn image_summary(position: usize, image: &ImageAttachment, options: NormalizeOptions) -> String {
    let mut line = format!("  {}. {} ({})", position, image.name, format_size(image.size));

    let encoded = image
        .data
        .as_ref()
        .and_then(encode_payload)
        .filter(|encoded| !encoded.is_empty());
    if let Some(encoded) = encoded {
        let preview: String = encoded.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if encoded.chars().count() > PREVIEW_CHARS { "..." } else { "" };
        line.push_str(&format!("\n     Base64 preview: {}{}", preview, ellipsis));
        line.push_str(&format!("\n     Base64 length: {} chars", encoded.len()));

        if options.include_full_base64 {
            line.push_str(&format!(
                "\n     Full Base64: data:{};base64,{}",
                image.format().mime_type(),
                encoded
            ));
        }
    }

    line
}

/// Human-readable byte count: B below 1 KiB, KB below 1 MiB, MB above.
pub fn format_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    }
}

/// Decode an attachment's payload to raw bytes.
pub fn decode(image: &ImageAttachment) -> std::result::Result<Vec<u8>, CodecError> {
    match &image.data {
        None => Err(CodecError::MissingPayload),
        Some(ImagePayload::Binary(bytes)) => Ok(bytes.clone()),
        Some(ImagePayload::Base64(encoded)) => {
            // Wrapped (MIME style) payloads carry line breaks.
            let compact: Vec<u8> = encoded
                .bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            BASE64_STANDARD
                .decode(&compact)
                .map_err(|e| CodecError::InvalidBase64(e.to_string()))
        }
        Some(ImagePayload::Unsupported(_)) => Err(CodecError::UnsupportedRepresentation),
    }
}

/// Base64 text for a payload, `None` if it has no textual form.
pub fn encode_payload(payload: &ImagePayload) -> Option<String> {
    match payload {
        ImagePayload::Binary(bytes) => Some(BASE64_STANDARD.encode(bytes)),
        ImagePayload::Base64(encoded) => Some(encoded.clone()),
        ImagePayload::Unsupported(_) => None,
    }
}

/// Persisted form of a feedback result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackDocument {
    #[serde(default)]
    pub interactive_feedback: Option<String>,
    #[serde(default)]
    pub command_logs: Option<String>,
    #[serde(default)]
    pub images: Vec<PersistedImage>,
}

/// Persisted image: payload is always base64 text or absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedImage {
    pub name: String,
    pub size: u64,
    pub data: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

impl FeedbackDocument {
    pub fn from_result(result: &FeedbackResult) -> Self {
        let images = result
            .images
            .iter()
            .map(|image| {
                let data = image.data.as_ref().and_then(encode_payload);
                if data.is_none() && image.data.is_some() {
                    warn!(
                        target: "feedback::codec",
                        "Image {} has an unsupported payload, persisting without data",
                        image.name
                    );
                }
                PersistedImage {
                    name: image.name.clone(),
                    size: image.size,
                    data_type: data.as_ref().map(|_| BASE64_DATA_TYPE.to_string()),
                    data,
                }
            })
            .collect();

        Self {
            interactive_feedback: result.interactive_feedback.clone(),
            command_logs: result.command_logs.clone(),
            images,
        }
    }

    pub fn into_result(self) -> FeedbackResult {
        FeedbackResult {
            interactive_feedback: self.interactive_feedback,
            command_logs: self.command_logs,
            images: self
                .images
                .into_iter()
                .map(|image| ImageAttachment {
                    name: image.name,
                    size: image.size,
                    data: image.data.map(ImagePayload::Base64),
                })
                .collect(),
        }
    }
}

/// Rewrite every payload into its storage form (base64 text).
pub fn canonicalize(result: &FeedbackResult) -> FeedbackResult {
    FeedbackDocument::from_result(result).into_result()
}

/// Write a result to a JSON document and return its path.
///
/// Without a path a fresh `feedback_<uuid>.json` in the temp directory is
/// used. Missing parent directories are created.
pub fn persist(result: &FeedbackResult, path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::temp_dir().join(format!("feedback_{}.json", Uuid::new_v4())),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let document = FeedbackDocument::from_result(result);
    std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;

    debug!(target: "feedback::codec", "Feedback saved to {}", path.display());
    Ok(path)
}

/// Read a persisted feedback document.
pub fn load(path: &Path) -> Result<FeedbackResult> {
    let content = std::fs::read_to_string(path)?;
    let document: FeedbackDocument = serde_json::from_str(&content)?;
    Ok(document.into_result())
}
