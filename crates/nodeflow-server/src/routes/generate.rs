use crate::error::{ApiError, ApiResult};
use crate::routes::header_value;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use nodeflow_core::config::Config;
use nodeflow_core::media::{is_http_url, MediaKind};
use nodeflow_core::types::{GenerateRequest, GenerateResponse, ProviderId};
use nodeflow_providers::providers::resolve_credentials;
use nodeflow_providers::schema::is_text_input;
use nodeflow_providers::{
    Credentials, GenerationRequest, GenerationResult, MediaPayload, ModelRef,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tracing::Instrument;

const REQUEST_ID_LEN: usize = 7;

pub const GEMINI_KEY_HEADER: &str = "X-Gemini-API-Key";
pub const REPLICATE_KEY_HEADER: &str = "X-Replicate-API-Key";
pub const FAL_KEY_HEADER: &str = "X-Fal-API-Key";

/// Short lowercase id tying together the log lines of one request.
pub fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<GenerateResponse>> {
    let span = tracing::info_span!("generate", request_id = %request_id());
    async move {
        let Json(body) = payload?;
        handle(&state, &headers, body).await.map(Json)
    }
    .instrument(span)
    .await
}

async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    body: GenerateRequest,
) -> ApiResult<GenerateResponse> {
    if !body.has_any_input() {
        return Err(missing_input());
    }

    let provider = body.provider();
    let mut request = canonical_request(&body, &state.config)?;
    // Dynamic inputs may carry only parameters. Image frames wired in for
    // Replicate and fal travel as parameters, so they still count here.
    if request.prompt.is_empty() && request.images.is_empty() && dynamic_images(&body).is_empty() {
        return Err(missing_input());
    }
    tracing::info!(
        %provider,
        model = %request.model.model_id,
        prompt_len = request.prompt.len(),
        images = request.images.len(),
        parameters = request.parameters.len(),
        "dispatching generation"
    );

    // Dropped on every exit path, which releases the hosted copies.
    let _hosted = match provider {
        ProviderId::Replicate | ProviderId::Fal => Some(state.hosted_images.stage(
            &mut request.images,
            &public_base_url(state, headers),
            state.config.server.hosted_image_threshold_kb * 1024,
        )),
        ProviderId::Gemini => None,
    };

    let creds = credentials(state, headers, provider);
    let result = state
        .gateway
        .generate(request, &creds)
        .await
        .map_err(|err| ApiError::from_provider(&err))?;

    match result {
        GenerationResult::Success(outputs) => {
            let media = outputs.into_first();
            tracing::info!(kind = %media.kind.as_str(), "generation succeeded");
            Ok(match (media.kind, media.payload) {
                (MediaKind::Video, MediaPayload::Inline(data)) => {
                    GenerateResponse::inline_video(data)
                }
                (MediaKind::Video, MediaPayload::Remote(url)) => GenerateResponse::video_url(url),
                (MediaKind::Image, MediaPayload::Inline(data) | MediaPayload::Remote(data)) => {
                    GenerateResponse::image(data)
                }
            })
        }
        GenerationResult::Failure(failure) => Err(ApiError::from_failure(failure, provider)),
    }
}

fn missing_input() -> ApiError {
    ApiError::BadRequest("Prompt or image input is required".to_string())
}

/// Origin under which providers can fetch hosted images.
fn public_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = state.config.server.public_url.as_deref() {
        return url.to_string();
    }
    match header_value(headers, "host") {
        Some(host) => format!("http://{host}"),
        None => format!(
            "http://{}:{}",
            state.config.server.bind_addr, state.config.server.port
        ),
    }
}

/// Replicate only accepts a caller-supplied key; Gemini and fal fall back to
/// the key held by the server.
fn credentials(state: &AppState, headers: &HeaderMap, provider: ProviderId) -> Credentials {
    match provider {
        ProviderId::Replicate => {
            Credentials::from_optional(header_value(headers, REPLICATE_KEY_HEADER))
        }
        ProviderId::Gemini => resolve_credentials(
            &state.gateway.provider_config(provider),
            header_value(headers, GEMINI_KEY_HEADER).as_deref(),
        ),
        ProviderId::Fal => resolve_credentials(
            &state.gateway.provider_config(provider),
            header_value(headers, FAL_KEY_HEADER).as_deref(),
        ),
    }
}

/// Translates the editor's request into the provider-neutral form.
pub fn canonical_request(body: &GenerateRequest, config: &Config) -> ApiResult<GenerationRequest> {
    let provider = body.provider();
    let prompt = body
        .prompt_text()
        .or_else(|| dynamic_prompt(body))
        .unwrap_or_default()
        .to_string();

    match provider {
        ProviderId::Gemini => {
            let model_id = body
                .selected_model
                .as_ref()
                .map(|m| m.model_id.as_str())
                .filter(|id| !id.is_empty())
                .or_else(|| body.model.as_deref().filter(|m| !m.is_empty()))
                .unwrap_or_else(|| config.gemini_model());

            let mut request = GenerationRequest::new(ModelRef::new(provider, model_id)).prompt(prompt);
            for image in body.image_list() {
                request = request.image(image.clone());
            }
            for image in dynamic_images(body) {
                request = request.image(image);
            }
            if let Some(ratio) = body.aspect_ratio.as_deref() {
                request = request.parameter("aspectRatio", ratio);
            }
            if let Some(resolution) = body.resolution.as_deref() {
                request = request.parameter("resolution", resolution);
            }
            if let Some(search) = body.use_google_search {
                request = request.parameter("useGoogleSearch", search);
            }
            Ok(request)
        }
        ProviderId::Replicate | ProviderId::Fal => {
            let selected = body
                .selected_model
                .as_ref()
                .filter(|m| !m.model_id.is_empty())
                .ok_or_else(|| {
                    ApiError::BadRequest("selectedModel.modelId is required".to_string())
                })?;
            let mut model = ModelRef::new(provider, selected.model_id.clone());
            if !selected.display_name.is_empty() {
                model = model.with_display_name(selected.display_name.clone());
            }

            let mut request = GenerationRequest::new(model).prompt(prompt);
            for image in body.image_list() {
                request = request.image(image.clone());
            }
            if let Some(parameters) = &body.parameters {
                request.parameters.extend(parameters.clone());
            }
            if let Some(inputs) = &body.dynamic_inputs {
                for (key, value) in inputs.iter().filter(|(k, _)| k.as_str() != "prompt") {
                    request.parameters.insert(key.clone(), value.clone());
                }
            }
            Ok(request)
        }
    }
}

fn dynamic_prompt(body: &GenerateRequest) -> Option<&str> {
    body.dynamic_inputs
        .as_ref()?
        .get("prompt")?
        .as_str()
        .filter(|p| !p.is_empty())
}

/// Image-like values wired in under provider field names such as `first_frame`.
fn dynamic_images(body: &GenerateRequest) -> Vec<String> {
    let Some(inputs) = &body.dynamic_inputs else {
        return Vec::new();
    };
    let mut images = Vec::new();
    for (key, value) in inputs {
        if is_text_input(key) {
            continue;
        }
        match value {
            Value::String(s) if is_image_value(s) => images.push(s.clone()),
            Value::Array(items) => images.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|s| is_image_value(s))
                    .map(str::to_string),
            ),
            _ => {}
        }
    }
    images
}

fn is_image_value(value: &str) -> bool {
    value.starts_with("data:") || is_http_url(value)
}
