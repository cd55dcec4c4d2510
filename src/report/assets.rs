use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};

fn mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub fn encode_data_uri(path: &Path, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type(path), STANDARD.encode(bytes))
}

/// Image file as a `data:` URI for embedding; `None` when the engine did not
/// produce it.
pub fn image_data_uri(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(encode_data_uri(path, &bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read report image");
            None
        }
    }
}
