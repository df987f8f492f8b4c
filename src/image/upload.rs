//! Loading user-supplied images.

use crate::error::{EditorError, Result};
use crate::image::types::{ImageData, ImageFormat};
use std::path::Path;

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Formats accepted for upload.
pub const ACCEPTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

/// An image selected by the user.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name shown next to the preview.
    pub name: String,
    /// Size of the file in bytes.
    pub size: u64,
    /// Decoded image.
    pub image: ImageData,
}

impl Upload {
    /// Human-readable file size.
    pub fn display_size(&self) -> String {
        format_file_size(self.size)
    }
}

/// Reads and validates an upload with the default size limit.
pub fn load_upload(path: impl AsRef<Path>) -> Result<Upload> {
    load_upload_with_limit(path, MAX_UPLOAD_BYTES)
}

/// Reads and validates an upload.
///
/// The extension must name an accepted format, the file must not exceed
/// `max_bytes` and its content must match the extension.
pub fn load_upload_with_limit(path: impl AsRef<Path>, max_bytes: u64) -> Result<Upload> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Current Image".to_string());

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFormat::from_extension)
        .filter(|f| ACCEPTED_FORMATS.contains(f))
        .ok_or_else(|| {
            EditorError::InvalidUpload(format!("{name}: only .png, .jpg and .jpeg files are accepted"))
        })?;

    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(EditorError::InvalidUpload(format!(
            "{name} is {}, maximum file size is {}",
            format_file_size(size),
            format_file_size(max_bytes)
        )));
    }

    let image = ImageData::new(std::fs::read(path)?, format);
    validate_upload(&name, &image, max_bytes)?;

    tracing::debug!(file = %name, size, "image loaded");

    Ok(Upload { name, size, image })
}

/// Checks an already decoded image against the upload rules.
///
/// Used for images that arrive without a file, such as data URLs. The
/// format must be accepted, the content must match it and the decoded size
/// must not exceed `max_bytes`.
pub fn validate_upload(name: &str, image: &ImageData, max_bytes: u64) -> Result<()> {
    if !ACCEPTED_FORMATS.contains(&image.format) {
        return Err(EditorError::InvalidUpload(format!(
            "{name}: only PNG and JPEG images are accepted"
        )));
    }

    let size = image.size() as u64;
    if size > max_bytes {
        return Err(EditorError::InvalidUpload(format!(
            "{name} is {}, maximum file size is {}",
            format_file_size(size),
            format_file_size(max_bytes)
        )));
    }

    if ImageFormat::from_magic_bytes(&image.data) != Some(image.format) {
        return Err(EditorError::InvalidUpload(format!(
            "{name} is not a valid {} image",
            image.format.extension()
        )));
    }

    Ok(())
}

/// Formats a byte count with 1024-based units, e.g. `1536 -> "1.5 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_048_576), "1 MB");
        assert_eq!(format_file_size(MAX_UPLOAD_BYTES), "10 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "cat.png", &PNG);

        let upload = load_upload(&path).unwrap();
        assert_eq!(upload.name, "cat.png");
        assert_eq!(upload.size, 12);
        assert_eq!(upload.image.format, ImageFormat::Png);
        assert_eq!(upload.display_size(), "12 Bytes");
    }

    #[test]
    fn test_rejects_unaccepted_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "cat.webp", b"RIFF\x00\x00\x00\x00WEBP");
        assert!(matches!(load_upload(&path), Err(EditorError::InvalidUpload(_))));
    }

    #[test]
    fn test_rejects_mismatched_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "cat.jpg", &PNG);
        assert!(matches!(load_upload(&path), Err(EditorError::InvalidUpload(_))));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "big.png", &PNG);
        let err = load_upload_with_limit(&path, 8).unwrap_err();
        assert!(err.to_string().contains("maximum file size is 8 Bytes"));
    }

    #[test]
    fn test_validate_decoded_image() {
        let png = ImageData::new(PNG.to_vec(), ImageFormat::Png);
        assert!(validate_upload("image", &png, MAX_UPLOAD_BYTES).is_ok());

        let err = validate_upload("image", &png, 8).unwrap_err();
        assert!(err.to_string().contains("maximum file size is 8 Bytes"));

        let webp = ImageData::new(b"RIFF\x00\x00\x00\x00WEBP".to_vec(), ImageFormat::WebP);
        assert!(matches!(
            validate_upload("image", &webp, MAX_UPLOAD_BYTES),
            Err(EditorError::InvalidUpload(_))
        ));

        // Declared as JPEG, carries PNG bytes.
        let mislabeled = ImageData::new(PNG.to_vec(), ImageFormat::Jpeg);
        assert!(matches!(
            validate_upload("image", &mislabeled, MAX_UPLOAD_BYTES),
            Err(EditorError::InvalidUpload(_))
        ));
    }
}
