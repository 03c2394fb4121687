use std::path::Path;

use base64::Engine;

use crate::error::{Result, TaskError};

/// MIME type for an image path, by extension. Defaults to `image/png`.
pub fn mime_from_ext(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "image/png",
    }
}

/// Value for an API `image` field.
///
/// `http(s)://` inputs are sent as-is; anything else is read from disk and
/// inlined as a `data:<mime>;base64,...` URI.
pub async fn image_value(input: &str) -> Result<String> {
    if input.starts_with("http://") || input.starts_with("https://") {
        return Ok(input.to_string());
    }

    let path = Path::new(input);
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        TaskError::Validation(format!("Cannot read image {}: {}", path.display(), e))
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "inlined local image");
    Ok(format!("data:{};base64,{}", mime_from_ext(path), encoded))
}
