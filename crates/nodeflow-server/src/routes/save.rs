use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use nodeflow_core::media::{decode_base64, extension_for_mime, is_http_url, InlineData, MediaKind};
use nodeflow_core::store;
use nodeflow_core::types::{SaveGenerationRequest, SaveGenerationResponse};
use std::path::PathBuf;

/// Bytes ready to be hashed, with the extension they will be stored under.
#[derive(Debug)]
struct ResolvedContent {
    bytes: Vec<u8>,
    extension: &'static str,
}

pub async fn save_generation(
    State(state): State<AppState>,
    payload: Result<Json<SaveGenerationRequest>, JsonRejection>,
) -> ApiResult<Json<SaveGenerationResponse>> {
    let Json(body) = payload?;

    let directory = body
        .directory_path
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from);
    let (Some(directory), Some((content, kind))) = (directory, body.content()) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    // Reject a bad target before downloading anything.
    store::ensure_directory(&directory)?;

    let resolved = resolve_content(&state, content, kind).await?;
    tracing::info!(
        directory = %directory.display(),
        kind = kind.as_str(),
        bytes = resolved.bytes.len(),
        extension = resolved.extension,
        "saving generation"
    );

    let prompt = body.prompt.clone();
    let stored = tokio::task::spawn_blocking(move || {
        store::save(&directory, &resolved.bytes, resolved.extension, prompt.as_deref())
    })
    .await??;

    Ok(Json(SaveGenerationResponse {
        success: true,
        file_path: stored.file_path.display().to_string(),
        filename: stored.filename,
        image_id: stored.logical_id,
        is_duplicate: stored.is_duplicate,
    }))
}

/// A URL is fetched, a data URL is decoded with its declared type, and bare
/// base64 is taken to be the kind of field it arrived in.
async fn resolve_content(
    state: &AppState,
    content: &str,
    kind: MediaKind,
) -> ApiResult<ResolvedContent> {
    if is_http_url(content) {
        let fetched = state
            .gateway
            .download(content)
            .await
            .map_err(|err| ApiError::Internal(format!("Failed to fetch content: {}", err.detail())))?;
        let mime = fetched
            .content_type
            .as_deref()
            .unwrap_or_else(|| kind.default_mime());
        return Ok(ResolvedContent {
            extension: extension_for_mime(mime),
            bytes: fetched.bytes.to_vec(),
        });
    }

    let (bytes, mime) = match InlineData::parse_data_url(content) {
        Some(inline) => (inline.decode(), inline.mime_type),
        None => (decode_base64(content), kind.default_mime().to_string()),
    };
    let bytes = bytes.map_err(|_| ApiError::BadRequest("Invalid base64 payload".to_string()))?;
    Ok(ResolvedContent {
        bytes,
        extension: extension_for_mime(&mime),
    })
}
