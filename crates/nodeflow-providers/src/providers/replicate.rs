use crate::config::ProviderConfig;
use crate::error::Result;
use crate::fetch::fetch_and_encode;
use crate::http::send_json;
use crate::poller::{JobSource, JobStatus, PollableJob, Poller};
use crate::router::base_url;
use crate::types::{Credentials, FailureCategory, GenerationRequest, GenerationResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;

pub const MISSING_KEY_MESSAGE: &str =
    "Replicate API key not configured. Include X-Replicate-API-Key header.";

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub latest_version: Option<ModelVersion>,
}

#[derive(Debug, Deserialize)]
pub struct ModelVersion {
    pub id: Option<String>,
    pub openapi_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl From<Prediction> for PollableJob {
    fn from(p: Prediction) -> Self {
        let error = match p.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };
        PollableJob {
            id: p.id,
            status: JobStatus::from_wire(&p.status),
            output: p.output.filter(|o| !o.is_null()),
            error,
        }
    }
}

/// `GET /models/{owner}/{name}`.
pub async fn model_info(client: &Client, base: &str, key: &str, model_id: &str) -> Result<ModelInfo> {
    let url = format!("{base}/models/{model_id}");
    let (info, _headers) = send_json::<ModelInfo>(client.get(url).bearer_auth(key)).await?;
    Ok(info)
}

/// Prediction body: prompt, then caller parameters, then the first image.
pub fn build_input(req: &GenerationRequest) -> Value {
    let mut input = serde_json::Map::new();
    input.insert("prompt".into(), json!(req.prompt));
    for (k, v) in &req.parameters {
        input.insert(k.clone(), v.clone());
    }
    if let Some(first) = req.images.first() {
        input.insert("image".into(), json!(first));
    }
    Value::Object(input)
}

/// First URL of a prediction output, which is either a string or a list.
pub fn first_output_url(output: Option<&Value>) -> Option<&str> {
    let url = match output? {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()),
        _ => None,
    };
    url.filter(|url| !url.is_empty())
}

struct Predictions<'a> {
    client: &'a Client,
    base: &'a str,
    key: &'a str,
}

#[async_trait]
impl JobSource for Predictions<'_> {
    async fn fetch(&self, id: &str) -> Result<PollableJob> {
        let url = format!("{}/predictions/{}", self.base, id);
        let (prediction, _headers) =
            send_json::<Prediction>(self.client.get(url).bearer_auth(self.key)).await?;
        Ok(prediction.into())
    }
}

pub async fn generate(
    client: &Client,
    cfg: &ProviderConfig,
    poller: &Poller,
    req: GenerationRequest,
    creds: &Credentials,
) -> Result<GenerationResult> {
    let Some(key) = creds.api_key.as_deref() else {
        return Ok(GenerationResult::failure(
            FailureCategory::CredentialMissing,
            MISSING_KEY_MESSAGE,
        ));
    };
    let model_id = req.model.model_id.as_str();
    if !model_id.contains('/') {
        return Ok(GenerationResult::failure(
            FailureCategory::ValidationError,
            format!("Replicate model id must look like owner/name, got: {model_id}"),
        ));
    }
    let base = base_url(cfg)?;

    tracing::info!(
        model = model_id,
        images = req.images.len(),
        prompt_len = req.prompt.len(),
        "generating with replicate"
    );

    let info = model_info(client, base, key, model_id).await?;
    let Some(version) = info.latest_version.and_then(|v| v.id) else {
        return Ok(GenerationResult::failure(
            FailureCategory::NoVersion,
            "Model has no available version",
        ));
    };

    let body = json!({ "version": version, "input": build_input(&req) });
    let (created, _headers) = send_json::<Prediction>(
        client
            .post(format!("{base}/predictions"))
            .bearer_auth(key)
            .json(&body),
    )
    .await?;
    // The poll deadline runs from submission, not from the model lookup.
    let started = Instant::now();
    tracing::debug!(prediction = %created.id, status = %created.status, "prediction created");

    let source = Predictions { client, base, key };
    let job = match poller.wait(&source, created.into(), started).await {
        Ok(job) => job,
        Err(failure) => return Ok(failure.into()),
    };

    let Some(url) = first_output_url(job.output.as_ref()) else {
        return Ok(GenerationResult::failure(
            FailureCategory::NoMediaUrl,
            "No output from prediction",
        ));
    };
    let encoded = fetch_and_encode(client, url, false).await?;
    tracing::info!(kind = encoded.media.kind.as_str(), "replicate generation successful");
    Ok(GenerationResult::success(encoded.media))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRef;
    use nodeflow_core::types::ProviderId;

    #[test]
    fn input_forwards_only_the_first_image() {
        let req = GenerationRequest::new(ModelRef::new(ProviderId::Replicate, "a/b"))
            .prompt("A fox")
            .image("data:image/png;base64,AAAA")
            .image("data:image/png;base64,BBBB")
            .parameter("seed", 7);
        let input = build_input(&req);
        assert_eq!(
            input,
            json!({ "prompt": "A fox", "seed": 7, "image": "data:image/png;base64,AAAA" })
        );
    }

    #[test]
    fn output_may_be_string_or_list() {
        let single = json!("https://cdn/a.png");
        assert_eq!(first_output_url(Some(&single)), Some("https://cdn/a.png"));
        let list = json!(["https://cdn/1.png", "https://cdn/2.png"]);
        assert_eq!(first_output_url(Some(&list)), Some("https://cdn/1.png"));
        assert_eq!(first_output_url(Some(&json!([]))), None);
        assert_eq!(first_output_url(None), None);
    }

    #[test]
    fn prediction_error_object_is_stringified() {
        let p: Prediction = serde_json::from_value(json!({
            "id": "x", "status": "failed", "output": null, "error": { "detail": "nsfw" }
        }))
        .unwrap();
        let job = PollableJob::from(p);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.output.is_none());
        assert_eq!(job.error.as_deref(), Some(r#"{"detail":"nsfw"}"#));
    }
}
