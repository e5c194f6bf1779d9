use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadedImage {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
}
