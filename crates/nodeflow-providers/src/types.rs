use nodeflow_core::media::MediaKind;
use nodeflow_core::types::ProviderId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: ProviderId,
    pub model_id: String,
    pub display_name: String,
}

impl ModelRef {
    pub fn new(provider: ProviderId, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            provider,
            display_name: model_id.clone(),
            model_id,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// Provider-neutral generation input.
///
/// `images` hold whatever the editor sent: data URLs, bare base64 or URLs.
/// `parameters` are forwarded to the provider as-is; the Gemini adapter
/// reads `aspectRatio`, `resolution` and `useGoogleSearch` from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<String>,
    pub model: ModelRef,
    pub parameters: Map<String, Value>,
}

impl GenerationRequest {
    pub fn new(model: ModelRef) -> Self {
        Self {
            prompt: String::new(),
            images: Vec::new(),
            model,
            parameters: Map::new(),
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn string_parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn flag_parameter(&self, key: &str) -> bool {
        self.parameters
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaPayload {
    /// `data:<mime>;base64,...`
    Inline(String),
    /// Provider-hosted URL the caller has to fetch itself.
    Remote(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedMedia {
    pub kind: MediaKind,
    pub payload: MediaPayload,
    pub mime_type: String,
    pub source_url: Option<String>,
}

/// Non-empty list of generated outputs; only the first is surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outputs {
    first: GeneratedMedia,
    rest: Vec<GeneratedMedia>,
}

impl Outputs {
    pub fn one(media: GeneratedMedia) -> Self {
        Self {
            first: media,
            rest: Vec::new(),
        }
    }

    pub fn from_vec(mut media: Vec<GeneratedMedia>) -> Option<Self> {
        if media.is_empty() {
            return None;
        }
        let first = media.remove(0);
        Some(Self { first, rest: media })
    }

    pub fn first(&self) -> &GeneratedMedia {
        &self.first
    }

    pub fn into_first(self) -> GeneratedMedia {
        self.first
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    ValidationError,
    CredentialMissing,
    RateLimited,
    NoResponse,
    NoContent,
    ModelRefusal,
    NoMediaUrl,
    NoVersion,
    JobFailed,
    Timeout,
    PollError,
    Canceled,
    Unknown,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    pub category: FailureCategory,
    pub message: String,
}

impl Failure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    Success(Outputs),
    Failure(Failure),
}

impl GenerationResult {
    pub fn success(media: GeneratedMedia) -> Self {
        GenerationResult::Success(Outputs::one(media))
    }

    pub fn failure(category: FailureCategory, message: impl Into<String>) -> Self {
        GenerationResult::Failure(Failure::new(category, message))
    }

    pub fn primary(&self) -> Option<&GeneratedMedia> {
        match self {
            GenerationResult::Success(outputs) => Some(outputs.first()),
            GenerationResult::Failure(_) => None,
        }
    }

    pub fn failure_category(&self) -> Option<FailureCategory> {
        match self {
            GenerationResult::Success(_) => None,
            GenerationResult::Failure(f) => Some(f.category),
        }
    }
}

impl From<Failure> for GenerationResult {
    fn from(failure: Failure) -> Self {
        GenerationResult::Failure(failure)
    }
}

/// API key resolved for a single request. `None` means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_optional(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}
