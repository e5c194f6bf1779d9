use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
};

use crate::{
    dto::images::UploadedImage,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::image_service::{self, MAX_IMAGE_BYTES},
    state::AppState,
};

const FILE_FIELD: &str = "file";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024))
}

#[utoipa::path(
    post,
    path = "/api/images",
    request_body(content_type = "multipart/form-data", description = "Image in the `file` field"),
    responses(
        (status = 201, description = "Image stored", body = ApiResponse<UploadedImage>),
        (status = 400, description = "Missing file, too large or not an image"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Images"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<UploadedImage>>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("could not read upload: {e}")))?;
        let resp = image_service::save_image(&state, &user, &bytes).await?;
        return Ok((StatusCode::CREATED, Json(resp)));
    }

    Err(AppError::BadRequest(format!(
        "multipart field `{FILE_FIELD}` is required"
    )))
}
