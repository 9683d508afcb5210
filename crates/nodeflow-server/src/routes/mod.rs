//! HTTP handlers.

pub mod generate;
pub mod health;
pub mod images;
pub mod load;
pub mod models;
pub mod save;

use crate::error::ApiError;
use axum::http::HeaderMap;

/// Non-empty value of a request header.
pub(crate) fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
