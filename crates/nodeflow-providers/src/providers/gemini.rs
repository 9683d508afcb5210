use crate::config::ProviderConfig;
use crate::error::Result;
use crate::http::send_json;
use crate::router::base_url;
use crate::types::{
    Credentials, FailureCategory, GeneratedMedia, GenerationRequest, GenerationResult,
    MediaPayload,
};
use nodeflow_core::media::{InlineData, MediaKind, DEFAULT_IMAGE_MIME};
use reqwest::Client;
use serde_json::{json, Map, Value};

pub const MISSING_KEY_MESSAGE: &str = "API key not configured. Add GEMINI_API_KEY to .env.local";

/// Capability tier of a Gemini image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Base,
    Pro,
}

/// Maps an editor alias or concrete id to the API model id and its tier.
pub fn resolve_model(name: &str) -> Option<(&'static str, Tier)> {
    match name {
        "nano-banana" | "gemini-2.5-flash-image" => Some(("gemini-2.5-flash-image", Tier::Base)),
        "nano-banana-pro" | "gemini-3-pro-image-preview" => {
            Some(("gemini-3-pro-image-preview", Tier::Pro))
        }
        _ => None,
    }
}

/// Builds the `generateContent` body.
///
/// Aspect ratio applies to both tiers. Image size and the search tool are only
/// attached for the pro tier and dropped otherwise.
pub fn build_request_body(req: &GenerationRequest, tier: Tier) -> Value {
    let mut parts = vec![json!({ "text": req.prompt })];
    for image in &req.images {
        let inline = InlineData::from_image_input(image);
        parts.push(json!({
            "inlineData": { "mimeType": inline.mime_type, "data": inline.data }
        }));
    }

    let mut image_config = Map::new();
    if let Some(aspect_ratio) = req.string_parameter("aspectRatio") {
        image_config.insert("aspectRatio".into(), json!(aspect_ratio));
    }
    if tier == Tier::Pro {
        if let Some(resolution) = req.string_parameter("resolution") {
            image_config.insert("imageSize".into(), json!(resolution));
        }
    }

    let mut generation_config = Map::new();
    generation_config.insert("responseModalities".into(), json!(["IMAGE", "TEXT"]));
    if !image_config.is_empty() {
        generation_config.insert("imageConfig".into(), Value::Object(image_config));
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    });
    if tier == Tier::Pro && req.flag_parameter("useGoogleSearch") {
        body["tools"] = json!([{ "googleSearch": {} }]);
    }
    body
}

/// Reads the first candidate of a `generateContent` response.
pub fn parse_response(resp: &Value) -> GenerationResult {
    let candidates = resp
        .get("candidates")
        .and_then(|v| v.as_array())
        .filter(|c| !c.is_empty());
    let Some(candidates) = candidates else {
        return GenerationResult::failure(FailureCategory::NoResponse, "No response from AI model");
    };

    let Some(parts) = candidates[0]
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
    else {
        return GenerationResult::failure(FailureCategory::NoContent, "No content in response");
    };

    for part in parts {
        let Some(inline) = part.get("inlineData") else {
            continue;
        };
        let Some(data) = inline
            .get("data")
            .and_then(|v| v.as_str())
            .filter(|d| !d.is_empty())
        else {
            continue;
        };
        let mime_type = inline
            .get("mimeType")
            .and_then(|v| v.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);
        tracing::debug!(mime_type, size_kb = data.len() / 1024, "found image in response");
        return GenerationResult::success(GeneratedMedia {
            kind: MediaKind::Image,
            payload: MediaPayload::Inline(format!("data:{mime_type};base64,{data}")),
            mime_type: mime_type.to_string(),
            source_url: None,
        });
    }

    for part in parts {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            if text.is_empty() {
                continue;
            }
            let preview: String = text.chars().take(200).collect();
            return GenerationResult::failure(
                FailureCategory::ModelRefusal,
                format!("Model returned text instead of image: {preview}"),
            );
        }
    }

    GenerationResult::failure(FailureCategory::NoContent, "No image in response")
}

pub async fn generate(
    client: &Client,
    cfg: &ProviderConfig,
    req: GenerationRequest,
    creds: &Credentials,
) -> Result<GenerationResult> {
    let Some(key) = creds.api_key.as_deref() else {
        return Ok(GenerationResult::failure(
            FailureCategory::CredentialMissing,
            MISSING_KEY_MESSAGE,
        ));
    };
    let Some((model, tier)) = resolve_model(&req.model.model_id) else {
        return Ok(GenerationResult::failure(
            FailureCategory::ValidationError,
            format!("Unknown Gemini model: {}", req.model.model_id),
        ));
    };

    tracing::info!(
        model = %req.model.model_id,
        api_model = model,
        images = req.images.len(),
        prompt_len = req.prompt.len(),
        aspect_ratio = req.string_parameter("aspectRatio").unwrap_or("default"),
        resolution = req.string_parameter("resolution").unwrap_or("default"),
        google_search = req.flag_parameter("useGoogleSearch"),
        "calling gemini"
    );

    let url = format!("{}/models/{}:generateContent", base_url(cfg)?, model);
    let body = build_request_body(&req, tier);
    let builder = client.post(url).header("x-goog-api-key", key).json(&body);

    let (resp, _headers) = send_json::<Value>(builder).await?;
    Ok(parse_response(&resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRef;
    use nodeflow_core::types::ProviderId;

    fn request(model: &str) -> GenerationRequest {
        GenerationRequest::new(ModelRef::new(ProviderId::Gemini, model))
    }

    fn parts(body: &Value) -> &Vec<Value> {
        body.pointer("/contents/0/parts")
            .and_then(|v| v.as_array())
            .unwrap()
    }

    #[test]
    fn prompt_only_builds_a_single_text_part() {
        let body = build_request_body(&request("nano-banana").prompt("A cat"), Tier::Base);
        let parts = parts(&body);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "A cat");
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
    }

    #[test]
    fn image_mime_types_come_from_the_data_url() {
        let req = request("nano-banana")
            .prompt("edit")
            .image("data:image/webp;base64,UklGRg==")
            .image("iVBORw0KGgo=");
        let body = build_request_body(&req, Tier::Base);
        let parts = parts(&body);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/webp");
        assert_eq!(parts[1]["inlineData"]["data"], "UklGRg==");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[2]["inlineData"]["data"], "iVBORw0KGgo=");
    }

    #[test]
    fn resolution_is_pro_only() {
        let req = request("x").prompt("p").parameter("resolution", "2K");
        let pro = build_request_body(&req, Tier::Pro);
        assert_eq!(pro["generationConfig"]["imageConfig"]["imageSize"], "2K");
        let base = build_request_body(&req, Tier::Base);
        assert!(base["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn aspect_ratio_applies_to_both_tiers() {
        let req = request("x").prompt("p").parameter("aspectRatio", "16:9");
        for tier in [Tier::Base, Tier::Pro] {
            let body = build_request_body(&req, tier);
            assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        }
    }

    #[test]
    fn search_tool_is_pro_only() {
        let req = request("x").prompt("p").parameter("useGoogleSearch", true);
        let pro = build_request_body(&req, Tier::Pro);
        assert_eq!(pro["tools"], json!([{ "googleSearch": {} }]));
        let base = build_request_body(&req, Tier::Base);
        assert!(base.get("tools").is_none());
    }

    #[test]
    fn aliases_resolve_to_api_models() {
        assert_eq!(
            resolve_model("nano-banana-pro"),
            Some(("gemini-3-pro-image-preview", Tier::Pro))
        );
        assert_eq!(
            resolve_model("gemini-2.5-flash-image"),
            Some(("gemini-2.5-flash-image", Tier::Base))
        );
        assert_eq!(resolve_model("imagen"), None);
    }

    #[test]
    fn empty_candidates_and_missing_parts_differ() {
        let result = parse_response(&json!({ "candidates": [] }));
        assert_eq!(result.failure_category(), Some(FailureCategory::NoResponse));
        let result = parse_response(&json!({ "candidates": [{ "finishReason": "SAFETY" }] }));
        assert_eq!(result.failure_category(), Some(FailureCategory::NoContent));
    }

    #[test]
    fn first_inline_part_wins() {
        let result = parse_response(&json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here you go" },
                { "inlineData": { "data": "AAAA" } },
                { "inlineData": { "mimeType": "image/jpeg", "data": "BBBB" } }
            ] } }]
        }));
        let media = result.primary().unwrap();
        assert_eq!(
            media.payload,
            MediaPayload::Inline("data:image/png;base64,AAAA".into())
        );
    }

    #[test]
    fn text_only_is_a_refusal_truncated_to_200_chars() {
        let long = "n".repeat(300);
        let result = parse_response(&json!({
            "candidates": [{ "content": { "parts": [{ "text": long }] } }]
        }));
        let GenerationResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.category, FailureCategory::ModelRefusal);
        assert_eq!(
            failure.message,
            format!("Model returned text instead of image: {}", "n".repeat(200))
        );
    }
}
