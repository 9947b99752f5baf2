//! Input validation helpers shared by the services.

use crate::error::{TraceError, TraceResult};
use crate::types::PhotoRef;

/// Maximum accepted label photo size: 10 MiB
pub const MAX_LABEL_PHOTO_BYTES: u64 = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "svg",
];

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
    "image/svg+xml",
];

/// Validate a label photo reference before attaching it to a record.
///
/// The bytes themselves live in media storage; this checks the declared
/// extension, content type and size against the plant's allow-list.
pub fn validate_label_photo(photo: &PhotoRef) -> TraceResult<()> {
    let name = photo.url.rsplit('/').next().unwrap_or(&photo.url);
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(TraceError::validation(format!(
                "Unsupported image format for {:?} (allowed: {})",
                name,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
    }

    if let Some(content_type) = photo.content_type.as_deref() {
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(TraceError::validation(format!(
                "Invalid content type: {}",
                content_type
            )));
        }
    }

    if photo.size_bytes > MAX_LABEL_PHOTO_BYTES {
        return Err(TraceError::validation(format!(
            "File too large: {} bytes (max {} bytes)",
            photo.size_bytes, MAX_LABEL_PHOTO_BYTES
        )));
    }

    Ok(())
}

/// Require a non-empty trimmed string field
pub fn require_non_empty(value: Option<&str>, field: &str) -> TraceResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(TraceError::validation(format!(
            "{} is required and must not be empty",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(url: &str, content_type: Option<&str>, size: u64) -> PhotoRef {
        PhotoRef {
            url: url.to_string(),
            content_type: content_type.map(String::from),
            size_bytes: size,
        }
    }

    #[test]
    fn accepts_known_image_formats() {
        for ext in ["jpg", "png", "webp", "TIF"] {
            let p = photo(&format!("https://media/plant/label.{}", ext), None, 1024);
            assert!(validate_label_photo(&p).is_ok(), "extension {}", ext);
        }
    }

    #[test]
    fn rejects_unknown_extension() {
        let p = photo("https://media/plant/label.pdf", None, 1024);
        assert!(validate_label_photo(&p).is_err());
    }

    #[test]
    fn rejects_missing_extension() {
        let p = photo("https://media/plant/label", None, 1024);
        assert!(validate_label_photo(&p).is_err());
    }

    #[test]
    fn rejects_bad_content_type() {
        let p = photo("https://media/plant/label.png", Some("application/pdf"), 1024);
        assert!(validate_label_photo(&p).is_err());
    }

    #[test]
    fn enforces_size_cap() {
        let p = photo("https://media/plant/label.png", None, MAX_LABEL_PHOTO_BYTES);
        assert!(validate_label_photo(&p).is_ok());

        let p = photo(
            "https://media/plant/label.png",
            None,
            MAX_LABEL_PHOTO_BYTES + 1,
        );
        assert!(validate_label_photo(&p).is_err());
    }

    #[test]
    fn non_empty_requires_content() {
        assert!(require_non_empty(Some("ok"), "field").is_ok());
        assert!(require_non_empty(Some("   "), "field").is_err());
        assert!(require_non_empty(None, "field").is_err());
    }
}
