use crate::config::ProviderConfig;
use crate::error::Result;
use crate::fetch::fetch_and_encode;
use crate::http::send_json;
use crate::router::base_url;
use crate::types::{Credentials, FailureCategory, GenerationRequest, GenerationResult};
use reqwest::Client;
use serde_json::{json, Value};

/// The shapes a fal.ai response can take, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FalOutput {
    /// `video.url`
    Video(String),
    /// `images[0].url`; the first entry may lack a url.
    ImageArray(Option<String>),
    /// `image.url`
    Image(String),
    /// `output` as a bare string.
    Text(String),
}

impl FalOutput {
    pub fn from_response(resp: &Value) -> Option<Self> {
        let url_at = |pointer: &str| {
            resp.pointer(pointer)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(url) = url_at("/video/url") {
            return Some(FalOutput::Video(url));
        }
        if resp
            .get("images")
            .and_then(|v| v.as_array())
            .is_some_and(|images| !images.is_empty())
        {
            return Some(FalOutput::ImageArray(url_at("/images/0/url")));
        }
        if let Some(url) = url_at("/image/url") {
            return Some(FalOutput::Image(url));
        }
        url_at("/output").map(FalOutput::Text)
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            FalOutput::Video(url) | FalOutput::Image(url) | FalOutput::Text(url) => Some(url),
            FalOutput::ImageArray(url) => url.as_deref(),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, FalOutput::Video(_))
    }
}

/// Request body: prompt, then caller parameters, then the first image as `image_url`.
pub fn build_body(req: &GenerationRequest) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("prompt".into(), json!(req.prompt));
    for (k, v) in &req.parameters {
        body.insert(k.clone(), v.clone());
    }
    if let Some(first) = req.images.first() {
        body.insert("image_url".into(), json!(first));
    }
    Value::Object(body)
}

pub async fn generate(
    client: &Client,
    cfg: &ProviderConfig,
    req: GenerationRequest,
    creds: &Credentials,
) -> Result<GenerationResult> {
    let model_id = req.model.model_id.trim_start_matches('/');
    tracing::info!(
        model = model_id,
        images = req.images.len(),
        prompt_len = req.prompt.len(),
        authenticated = creds.api_key.is_some(),
        "generating with fal.ai"
    );

    let url = format!("{}/{}", base_url(cfg)?, model_id);
    let mut builder = client.post(url).json(&build_body(&req));
    if let Some(key) = creds.api_key.as_deref() {
        builder = builder.header(reqwest::header::AUTHORIZATION, format!("Key {key}"));
    }

    let (resp, _headers) = send_json::<Value>(builder).await?;
    let output = FalOutput::from_response(&resp);
    let Some((url, is_video)) = output
        .as_ref()
        .and_then(|o| o.media_url().map(|url| (url, o.is_video())))
    else {
        tracing::error!("no media url found in fal.ai response");
        return Ok(GenerationResult::failure(
            FailureCategory::NoMediaUrl,
            "No media URL in response",
        ));
    };

    let encoded = fetch_and_encode(client, url, is_video).await?;
    tracing::info!(kind = encoded.media.kind.as_str(), "fal.ai generation successful");
    Ok(GenerationResult::success(encoded.media))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRef;
    use nodeflow_core::types::ProviderId;

    #[test]
    fn video_wins_over_images() {
        let out = FalOutput::from_response(&json!({
            "images": [{ "url": "https://cdn/i.png" }],
            "video": { "url": "https://cdn/v.mp4" }
        }));
        assert_eq!(out, Some(FalOutput::Video("https://cdn/v.mp4".into())));
    }

    #[test]
    fn images_array_before_single_image_before_output() {
        let out = FalOutput::from_response(&json!({
            "image": { "url": "https://cdn/single.png" },
            "images": [{ "url": "https://cdn/first.png" }],
            "output": "https://cdn/out.png"
        }));
        assert_eq!(out.unwrap().media_url(), Some("https://cdn/first.png"));

        let out = FalOutput::from_response(&json!({
            "image": { "url": "https://cdn/single.png" },
            "output": "https://cdn/out.png"
        }));
        assert_eq!(out, Some(FalOutput::Image("https://cdn/single.png".into())));

        let out = FalOutput::from_response(&json!({ "output": "https://cdn/out.png" }));
        assert_eq!(out, Some(FalOutput::Text("https://cdn/out.png".into())));
    }

    #[test]
    fn image_entry_without_url_has_no_media() {
        let out = FalOutput::from_response(&json!({
            "images": [{ "content_type": "image/png" }],
            "image": { "url": "https://cdn/ignored.png" }
        }))
        .unwrap();
        assert_eq!(out.media_url(), None);
        assert!(FalOutput::from_response(&json!({ "seed": 1 })).is_none());
    }

    #[test]
    fn body_uses_image_url_for_first_image() {
        let req = GenerationRequest::new(ModelRef::new(ProviderId::Fal, "fal-ai/flux/dev"))
            .prompt("A boat")
            .image("https://cdn/in.png")
            .image("https://cdn/other.png")
            .parameter("num_inference_steps", 28);
        assert_eq!(
            build_body(&req),
            json!({ "prompt": "A boat", "num_inference_steps": 28, "image_url": "https://cdn/in.png" })
        );
    }
}
