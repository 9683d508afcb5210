//! JSON contract shared by the editor and the generation server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::media::MediaKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Gemini,
    Replicate,
    Fal,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Replicate => "replicate",
            ProviderId::Fal => "fal",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "replicate" => Ok(ProviderId::Replicate),
            "fal" => Ok(ProviderId::Fal),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedModel {
    pub provider: ProviderId,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub images: Option<Vec<String>>,
    /// Legacy Gemini model alias (`nano-banana`, `nano-banana-pro`).
    pub model: Option<String>,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub use_google_search: Option<bool>,
    pub selected_model: Option<SelectedModel>,
    pub parameters: Option<Map<String, Value>>,
    /// Alternate wiring where inputs arrive under provider field names.
    pub dynamic_inputs: Option<BTreeMap<String, Value>>,
}

impl GenerateRequest {
    pub fn prompt_text(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }

    pub fn image_list(&self) -> &[String] {
        self.images.as_deref().unwrap_or_default()
    }

    pub fn has_dynamic_inputs(&self) -> bool {
        self.dynamic_inputs
            .as_ref()
            .is_some_and(|inputs| !inputs.is_empty())
    }

    pub fn has_any_input(&self) -> bool {
        self.prompt_text().is_some() || !self.image_list().is_empty() || self.has_dynamic_inputs()
    }

    pub fn provider(&self) -> ProviderId {
        self.selected_model
            .as_ref()
            .map(|m| m.provider)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    pub fn image(data: impl Into<String>) -> Self {
        Self {
            success: true,
            image: Some(data.into()),
            content_type: Some(MediaKind::Image),
            ..Default::default()
        }
    }

    pub fn inline_video(data: impl Into<String>) -> Self {
        Self {
            success: true,
            video: Some(data.into()),
            content_type: Some(MediaKind::Video),
            ..Default::default()
        }
    }

    pub fn video_url(url: impl Into<String>) -> Self {
        Self {
            success: true,
            video_url: Some(url.into()),
            content_type: Some(MediaKind::Video),
            ..Default::default()
        }
    }
}

/// `{success: false, error}` body returned by every endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Body of `POST /api/save-generation`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveGenerationRequest {
    pub directory_path: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
    pub prompt: Option<String>,
    pub image_id: Option<String>,
}

impl SaveGenerationRequest {
    /// The payload to persist and whether it was supplied as a video.
    pub fn content(&self) -> Option<(&str, MediaKind)> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        non_empty(&self.video)
            .map(|v| (v, MediaKind::Video))
            .or_else(|| non_empty(&self.image).map(|i| (i, MediaKind::Image)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaveGenerationResponse {
    pub success: bool,
    pub file_path: String,
    pub filename: String,
    pub image_id: String,
    pub is_duplicate: bool,
}

/// Body of `POST /api/load-generation`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadGenerationRequest {
    pub directory_path: Option<String>,
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadGenerationResponse {
    pub success: bool,
    pub content_type: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_request_reads_camel_case() {
        let req: GenerateRequest = serde_json::from_value(json!({
            "prompt": "A cat",
            "aspectRatio": "16:9",
            "useGoogleSearch": true,
            "selectedModel": { "provider": "fal", "modelId": "fal-ai/flux/dev", "displayName": "Flux" },
            "dynamicInputs": { "first_frame": "data:image/png;base64,AAAA" }
        }))
        .unwrap();
        assert_eq!(req.provider(), ProviderId::Fal);
        assert_eq!(req.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(req.use_google_search, Some(true));
        assert!(req.has_dynamic_inputs());
    }

    #[test]
    fn empty_request_has_no_input() {
        let req: GenerateRequest =
            serde_json::from_value(json!({ "prompt": "", "images": [], "dynamicInputs": {} }))
                .unwrap();
        assert!(!req.has_any_input());
        assert_eq!(req.provider(), ProviderId::Gemini);
    }

    #[test]
    fn success_response_omits_unset_fields() {
        let value = serde_json::to_value(GenerateResponse::video_url("https://x/y.mp4")).unwrap();
        assert_eq!(
            value,
            json!({ "success": true, "videoUrl": "https://x/y.mp4", "contentType": "video" })
        );
    }

    #[test]
    fn save_request_prefers_video() {
        let req = SaveGenerationRequest {
            image: Some("img".into()),
            video: Some("vid".into()),
            ..Default::default()
        };
        assert_eq!(req.content(), Some(("vid", MediaKind::Video)));
    }

    #[test]
    fn save_request_skips_empty_video() {
        let req = SaveGenerationRequest {
            image: Some("img".into()),
            video: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(req.content(), Some(("img", MediaKind::Image)));
        assert_eq!(SaveGenerationRequest::default().content(), None);
    }
}
