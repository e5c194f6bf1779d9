use tokio::fs;
use uuid::Uuid;

use crate::{
    audit,
    dto::images::UploadedImage,
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const UPLOADS_PATH: &str = "/uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageKind {
    pub extension: &'static str,
    pub content_type: &'static str,
}

/// Identifies the format from the file's magic bytes; the client-supplied
/// content type is not trusted.
pub fn detect_image(bytes: &[u8]) -> Option<ImageKind> {
    let kind = |extension, content_type| ImageKind {
        extension,
        content_type,
    };
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some(kind("jpg", "image/jpeg")),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(kind("png", "image/png")),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(kind("gif", "image/gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some(kind("webp", "image/webp"))
        }
        _ => None,
    }
}

pub async fn save_image(
    state: &AppState,
    user: &AuthUser,
    bytes: &[u8],
) -> AppResult<ApiResponse<UploadedImage>> {
    ensure_admin(user)?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("file is empty".into()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest("image must be at most 5 MiB".into()));
    }
    let kind = detect_image(bytes).ok_or_else(|| {
        AppError::BadRequest("only jpeg, png, webp and gif images are accepted".into())
    })?;

    let dir = &state.config.upload_dir;
    fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::internal(format!("create {}: {e}", dir.display())))?;

    let file_name = format!("{}.{}", Uuid::new_v4().simple(), kind.extension);
    let path = dir.join(&file_name);
    fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::internal(format!("write {}: {e}", path.display())))?;

    let url = format!(
        "{}{}/{}",
        state.config.public_base_url.trim_end_matches('/'),
        UPLOADS_PATH,
        file_name
    );
    tracing::info!(file = %file_name, size = bytes.len(), "image uploaded");
    audit::record(
        state,
        Some(user.user_id),
        "image_upload",
        "images",
        serde_json::json!({ "file": file_name, "size": bytes.len() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Image uploaded",
        UploadedImage {
            url,
            file_name,
            content_type: kind.content_type.to_string(),
            size: bytes.len(),
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_supported_formats() {
        assert_eq!(detect_image(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap().extension, "jpg");
        assert_eq!(
            detect_image(b"\x89PNG\r\n\x1a\n....").unwrap().content_type,
            "image/png"
        );
        assert_eq!(detect_image(b"GIF89a...").unwrap().extension, "gif");
        assert_eq!(detect_image(b"RIFF\x10\0\0\0WEBPVP8 ").unwrap().extension, "webp");
    }

    #[test]
    fn rejects_other_content() {
        assert!(detect_image(b"<svg xmlns=").is_none());
        assert!(detect_image(b"%PDF-1.7").is_none());
        assert!(detect_image(&[]).is_none());
        assert!(detect_image(b"RIFF\x10\0\0\0WAVEfmt ").is_none());
    }
}
