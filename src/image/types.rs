//! Core types for image editing.

use crate::error::{EditorError, Result};
use crate::history::HistoryEntry;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Attempts to detect format from a MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Decoded image bytes with their format.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("format", &self.format)
            .field("size", &self.data.len())
            .finish()
    }
}

impl ImageData {
    /// Wraps bytes with a known format.
    pub fn new(data: Vec<u8>, format: ImageFormat) -> Self {
        Self { data, format }
    }

    /// Wraps bytes, detecting the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| EditorError::Decode("Unknown image format".into()))?;
        Ok(Self::new(data, format))
    }

    /// Parses a `data:<mime>;base64,<payload>` URL.
    ///
    /// Whitespace inside the payload and missing padding are tolerated. When
    /// the declared MIME type is unknown the format is sniffed from the bytes.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| EditorError::Decode("not a data URL".into()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| EditorError::Decode("data URL has no payload".into()))?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or_else(|| EditorError::Decode("data URL is not base64 encoded".into()))?;

        let data = decode_base64_lenient(payload)?;
        let format = ImageFormat::from_mime_type(mime)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .ok_or_else(|| EditorError::Decode(format!("unsupported image type: {mime}")))?;
        Ok(Self::new(data, format))
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

/// Decodes base64 that may carry whitespace or lack padding.
pub(crate) fn decode_base64_lenient(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .map_err(|e| EditorError::Decode(e.to_string()))
}

/// Body of an edit call: a prompt, the image being edited and prior turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    /// The text instruction.
    pub prompt: String,
    /// Image to edit, as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Previous turns, omitted when there are none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl EditRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            history: None,
        }
    }

    /// Sets the image to edit.
    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.image = Some(data_url.into());
        self
    }

    /// Sets the conversation history. An empty history is dropped.
    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = if history.is_empty() {
            None
        } else {
            Some(history)
        };
        self
    }

    /// Returns true if this edits an existing image.
    pub fn is_edit(&self) -> bool {
        self.image.is_some()
    }
}

/// Metadata about the generation process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditMetadata {
    /// Model used for generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Round-trip duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Result of an edit call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[must_use = "edit response should be applied or saved"]
pub struct EditResponse {
    /// Generated image as a data URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Text the model returned alongside the image.
    #[serde(default)]
    pub description: Option<String>,
    /// Generation metadata.
    #[serde(default, skip_serializing)]
    pub metadata: EditMetadata,
}

impl EditResponse {
    /// Decodes the returned image.
    pub fn image_data(&self) -> Result<ImageData> {
        let url = self.image.as_deref().ok_or(EditorError::NoImage)?;
        ImageData::from_data_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a"), None);
    }

    #[test]
    fn test_format_from_extension_and_mime() {
        assert_eq!(ImageFormat::from_extension("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("gif"), None);
        assert_eq!(ImageFormat::from_mime_type("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_mime_type("text/plain"), None);
    }

    #[test]
    fn test_data_url_parsing() {
        let image = ImageData::new(PNG_MAGIC.to_vec(), ImageFormat::Png);
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let parsed = ImageData::from_data_url(&url).unwrap();
        assert_eq!(parsed, image);
    }

    #[test]
    fn test_data_url_lenient_payload() {
        // "hello" without padding and with a line break.
        let parsed = ImageData::from_data_url("data:image/png;base64,aGVs\nbG8").unwrap();
        assert_eq!(parsed.data, b"hello");
        assert_eq!(parsed.format, ImageFormat::Png);
    }

    #[test]
    fn test_data_url_sniffs_unknown_mime() {
        let b64 = base64::engine::general_purpose::STANDARD.encode(JPEG_MAGIC);
        let parsed =
            ImageData::from_data_url(&format!("data:application/octet-stream;base64,{b64}"))
                .unwrap();
        assert_eq!(parsed.format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_data_url_rejects_garbage() {
        assert!(ImageData::from_data_url("https://example.com/a.png").is_err());
        assert!(ImageData::from_data_url("data:image/png,raw").is_err());
        assert!(ImageData::from_data_url("data:image/png;base64").is_err());
        assert!(ImageData::from_data_url("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn test_edit_request_json_shape() {
        let req = EditRequest::new("make it blue").with_history(Vec::new());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["prompt"], "make it blue");
        assert!(json.get("image").is_none());
        assert!(json.get("history").is_none());
        assert!(!req.is_edit());

        let req = req.with_image("data:image/png;base64,AAAA");
        assert!(req.is_edit());
    }

    #[test]
    fn test_edit_response_image_data() {
        let empty = EditResponse::default();
        assert!(matches!(empty.image_data(), Err(EditorError::NoImage)));

        let resp = EditResponse {
            image: Some(ImageData::new(PNG_MAGIC.to_vec(), ImageFormat::Png).to_data_url()),
            description: Some("a square".into()),
            metadata: EditMetadata::default(),
        };
        assert_eq!(resp.image_data().unwrap().format, ImageFormat::Png);
    }
}
