use crate::error::{ApiError, ApiResult};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use nodeflow_core::media::{encode_data_url, MediaKind};
use nodeflow_core::store;
use nodeflow_core::types::{LoadGenerationRequest, LoadGenerationResponse};
use std::path::PathBuf;

pub async fn load_generation(
    payload: Result<Json<LoadGenerationRequest>, JsonRejection>,
) -> ApiResult<Json<LoadGenerationResponse>> {
    let Json(body) = payload?;
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (Some(directory), Some(image_id)) = (
        non_empty(body.directory_path),
        non_empty(body.image_id),
    ) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let directory = PathBuf::from(directory);
    let artifact = tokio::task::spawn_blocking(move || store::load(&directory, &image_id)).await??;
    tracing::info!(
        file_path = %artifact.file_path.display(),
        bytes = artifact.bytes.len(),
        "generation loaded"
    );

    let data_url = encode_data_url(artifact.mime_type, &artifact.bytes);
    let (image, video) = match artifact.kind {
        MediaKind::Image => (Some(data_url), None),
        MediaKind::Video => (None, Some(data_url)),
    };
    Ok(Json(LoadGenerationResponse {
        success: true,
        content_type: artifact.kind,
        image,
        video,
    }))
}
