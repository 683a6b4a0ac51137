use std::path::Path;

use base64::{Engine, engine::general_purpose};

use crate::core::error::{StrmHelperError, StrmHelperResult};

/// Decode a QR code payload (a base64 data URL or bare base64) and write
/// the image to `path`. Returns the number of bytes written.
pub async fn write_qr_image(payload: &str, path: &Path) -> StrmHelperResult<usize> {
    let image_error = |message: String| StrmHelperError::QrImage {
        path: path.display().to_string(),
        message,
    };

    let encoded = match payload.split_once(";base64,") {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| image_error(format!("payload is not base64: {e}")))?;

    tokio::fs::write(path, &bytes)
        .await
        .map_err(|e| image_error(e.to_string()))?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote QR code image");
    Ok(bytes.len())
}
