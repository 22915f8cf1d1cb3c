use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    if let Some(kind) = infer::get(data) {
        return Some(kind.mime_type().to_string());
    }

    image::guess_format(data)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Sniffed image MIME type, or JPEG when the bytes do not identify themselves as an image.
pub fn image_mime_or_default(data: &[u8]) -> String {
    detect_mime_type(data)
        .filter(|mime| mime.starts_with("image/"))
        .map(|mime| normalize_image_mime(&mime))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string())
}

pub fn is_image(data: &[u8]) -> bool {
    detect_mime_type(data).is_some_and(|mime| mime.starts_with("image/"))
}

fn normalize_image_mime(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

pub fn to_data_uri(data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        image_mime_or_default(data),
        general_purpose::STANDARD.encode(data)
    )
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Pulls `error.message` (or a top-level `message`) out of a JSON error body.
pub fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Smallest well-formed PNG header, enough for format sniffing.
    pub const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89,
    ];

    pub const JPEG_BYTES: &[u8] = &[
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00,
    ];
}
