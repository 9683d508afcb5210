use crate::error::{ApiError, ApiResult};
use crate::routes::header_value;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use nodeflow_core::types::ProviderId;
use nodeflow_providers::providers::resolve_credentials;
use nodeflow_providers::schema::{ModelInput, ModelParameter};
use nodeflow_providers::{Credentials, SchemaCache};
use serde::{Deserialize, Serialize};

pub const REPLICATE_SCHEMA_KEY_HEADER: &str = "X-Replicate-Key";
pub const FAL_SCHEMA_KEY_HEADER: &str = "X-Fal-Key";

#[derive(Debug, Deserialize)]
pub struct SchemaQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub parameters: Vec<ModelParameter>,
    pub inputs: Vec<ModelInput>,
    pub cached: bool,
}

pub async fn model_schema(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Query(query): Query<SchemaQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<SchemaResponse>> {
    let provider = match query.provider.as_deref() {
        Some("replicate") => ProviderId::Replicate,
        Some("fal") => ProviderId::Fal,
        _ => {
            return Err(ApiError::BadRequest(
                "Invalid or missing provider. Use ?provider=replicate or ?provider=fal"
                    .to_string(),
            ))
        }
    };

    let key = SchemaCache::key(provider.as_str(), &model_id);
    if let Some(schema) = state.schema_cache.get(&key) {
        tracing::debug!(%key, "schema cache hit");
        return Ok(Json(SchemaResponse {
            success: true,
            parameters: schema.parameters,
            inputs: schema.inputs,
            cached: true,
        }));
    }

    let cfg = state.gateway.provider_config(provider);
    let creds = match provider {
        ProviderId::Replicate => {
            let creds = resolve_credentials(
                &cfg,
                header_value(&headers, REPLICATE_SCHEMA_KEY_HEADER).as_deref(),
            );
            if creds.api_key.is_none() {
                return Err(ApiError::Unauthorized(
                    "Replicate API key required. Add REPLICATE_API_KEY to .env.local or configure in Settings."
                        .to_string(),
                ));
            }
            creds
        }
        ProviderId::Fal => {
            resolve_credentials(&cfg, header_value(&headers, FAL_SCHEMA_KEY_HEADER).as_deref())
        }
        ProviderId::Gemini => Credentials::anonymous(),
    };

    let schema = state
        .gateway
        .model_schema(provider, &model_id, &creds)
        .await
        .map_err(|err| {
            tracing::error!(%model_id, error = %err, "schema fetch failed");
            ApiError::Internal(err.detail().to_string())
        })?;
    tracing::info!(
        %key,
        parameters = schema.parameters.len(),
        inputs = schema.inputs.len(),
        "schema fetched"
    );
    state.schema_cache.insert(key, schema.clone());

    Ok(Json(SchemaResponse {
        success: true,
        parameters: schema.parameters,
        inputs: schema.inputs,
        cached: false,
    }))
}
