use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nodeflow_core::store::StoreError;
use nodeflow_core::types::{ErrorBody, ProviderId};
use nodeflow_providers::{Failure, FailureCategory, ProviderError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Longest debug detail appended to an unclassified failure.
const DETAIL_LIMIT: usize = 500;

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit reached. Please wait and try again.";

/// Every failure is rendered as `{success: false, error}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Rate limit reached. Please wait and try again.")]
    RateLimited,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps an adapter failure to its HTTP shape.
    ///
    /// A missing key is the caller's fault for external providers but a server
    /// misconfiguration for Gemini, whose key is held by the server.
    pub fn from_failure(failure: Failure, provider: ProviderId) -> Self {
        tracing::warn!(category = %failure.category, error = %failure.message, "generation failed");
        match failure.category {
            FailureCategory::ValidationError => ApiError::BadRequest(failure.message),
            FailureCategory::CredentialMissing if provider != ProviderId::Gemini => {
                ApiError::Unauthorized(failure.message)
            }
            FailureCategory::RateLimited => ApiError::RateLimited,
            _ => ApiError::Internal(failure.message),
        }
    }

    /// Classifies an error that escaped an adapter.
    pub fn from_provider(err: &ProviderError) -> Self {
        let failure = err.to_failure();
        tracing::error!(category = %failure.category, error = ?err, "provider call failed");
        if failure.category == FailureCategory::RateLimited {
            return ApiError::RateLimited;
        }
        let detail: String = format!("{err:?}").chars().take(DETAIL_LIMIT).collect();
        ApiError::Internal(format!("{} | Details: {}", failure.message, detail))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DirectoryMissing(_)
            | StoreError::NotADirectory(_)
            | StoreError::InvalidId(_) => {
                ApiError::BadRequest(err.to_string())
            }
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
