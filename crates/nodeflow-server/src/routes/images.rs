use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Serves an input image parked for the duration of a generation.
pub async fn hosted_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let image = state
        .hosted_images
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;
    tracing::debug!(id = %id, bytes = image.bytes.len(), "serving hosted image");
    Ok(([(header::CONTENT_TYPE, image.mime_type)], image.bytes).into_response())
}
