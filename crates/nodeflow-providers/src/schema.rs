//! Model parameter schemas for the editor's dynamic parameter panels.
//!
//! Replicate and fal.ai both publish an OpenAPI description of each model's
//! input. This module turns that into two flat lists: connectable inputs
//! (images and text the editor can wire into the node) and tunable
//! parameters. Results are cached process-wide for [`SCHEMA_TTL`].

use crate::error::{ProviderError, Result};
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SCHEMA_TTL: Duration = Duration::from_secs(10 * 60);

const IMAGE_INPUT_NAMES: &[&str] = &[
    "image_url",
    "image_urls",
    "image",
    "first_frame",
    "last_frame",
    "tail_image_url",
    "start_image",
    "end_image",
    "reference_image",
    "init_image",
    "mask_image",
    "control_image",
];

const TEXT_INPUT_NAMES: &[&str] = &["prompt", "negative_prompt"];

/// Names matching the image patterns that are really parameters.
const IMAGE_PATTERN_EXCLUSIONS: &[&str] = &["image_size"];

const EXCLUDED_PARAMS: &[&str] = &[
    "webhook",
    "webhook_events_filter",
    "sync_mode",
    "disable_safety_checker",
    "go_fast",
    "enable_safety_checker",
    "output_format",
    "output_quality",
    "request_id",
];

const PRIORITY_PARAMS: &[&str] = &[
    "seed",
    "num_inference_steps",
    "inference_steps",
    "steps",
    "guidance_scale",
    "guidance",
    "negative_prompt",
    "width",
    "height",
    "image_size",
    "num_outputs",
    "num_images",
    "scheduler",
    "strength",
    "cfg_scale",
    "lora_scale",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl ParameterType {
    fn from_schema(ty: Option<&str>) -> Option<Self> {
        match ty? {
            "integer" => Some(ParameterType::Integer),
            "number" => Some(ParameterType::Number),
            "boolean" => Some(ParameterType::Boolean),
            "array" => Some(ParameterType::Array),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Image,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InputType,
    pub required: bool,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedSchema {
    pub parameters: Vec<ModelParameter>,
    pub inputs: Vec<ModelInput>,
}

pub fn is_image_input(name: &str) -> bool {
    if IMAGE_INPUT_NAMES.contains(&name) {
        return true;
    }
    if IMAGE_PATTERN_EXCLUSIONS.contains(&name) {
        return false;
    }
    name.ends_with("_image") || name.starts_with("image_") || name.contains("_image_")
}

pub fn is_text_input(name: &str) -> bool {
    TEXT_INPUT_NAMES.contains(&name)
}

/// `tail_image_url` -> `Tail Image`.
pub fn to_label(name: &str) -> String {
    name.strip_suffix("_url")
        .unwrap_or(name)
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_ref<'a>(reference: &str, components: Option<&'a Map<String, Value>>) -> Option<&'a Value> {
    let name = reference.strip_prefix("#/components/schemas/")?;
    components?.get(name)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn convert_property(
    name: &str,
    prop: &Value,
    required: &[&str],
    components: Option<&Map<String, Value>>,
) -> Option<ModelParameter> {
    if EXCLUDED_PARAMS.contains(&name) {
        return None;
    }

    let mut kind = ParameterType::from_schema(prop.get("type").and_then(|v| v.as_str()));
    let mut enum_values = None;
    let mut resolved_default = None;
    let mut resolved_description = None;

    if kind.is_none() {
        for item in prop
            .get("allOf")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
        {
            if let Some(reference) = item.get("$ref").and_then(|v| v.as_str()) {
                let Some(resolved) = resolve_ref(reference, components) else {
                    continue;
                };
                if let Some(ty) = ParameterType::from_schema(resolved.get("type").and_then(|v| v.as_str()))
                    .filter(|t| *t != ParameterType::Array)
                {
                    kind = Some(ty);
                }
                if let Some(values) = resolved.get("enum").and_then(|v| v.as_array()) {
                    enum_values = Some(values.clone());
                }
                if resolved_default.is_none() {
                    resolved_default = resolved.get("default").cloned();
                }
                if resolved_description.is_none() {
                    resolved_description = str_field(resolved, "description").filter(|d| !d.is_empty());
                }
            } else if let Some(values) = item.get("enum").and_then(|v| v.as_array()) {
                enum_values = Some(values.clone());
            }
        }
    }

    Some(ModelParameter {
        name: name.to_string(),
        kind: kind.unwrap_or(ParameterType::String),
        description: str_field(prop, "description")
            .filter(|d| !d.is_empty())
            .or(resolved_description),
        default: prop.get("default").cloned().or(resolved_default),
        required: required.contains(&name),
        minimum: prop.get("minimum").and_then(|v| v.as_f64()),
        maximum: prop.get("maximum").and_then(|v| v.as_f64()),
        enum_values: prop
            .get("enum")
            .and_then(|v| v.as_array())
            .cloned()
            .or(enum_values),
    })
}

/// Splits an OpenAPI object schema into inputs and parameters.
pub fn extract_schema(schema: &Value, components: Option<&Map<String, Value>>) -> ExtractedSchema {
    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return ExtractedSchema::default();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
        .unwrap_or_default();

    let mut parameters = Vec::new();
    let mut inputs = Vec::new();

    for (name, prop) in properties {
        let input_kind = if is_image_input(name) {
            Some(InputType::Image)
        } else if is_text_input(name) {
            Some(InputType::Text)
        } else {
            None
        };
        match input_kind {
            Some(kind) => inputs.push(ModelInput {
                name: name.clone(),
                kind,
                required: required.contains(&name.as_str()),
                label: to_label(name),
                description: str_field(prop, "description"),
            }),
            None => parameters.extend(convert_property(name, prop, &required, components)),
        }
    }

    parameters.sort_by(|a, b| {
        let a_priority = PRIORITY_PARAMS.contains(&a.name.as_str());
        let b_priority = PRIORITY_PARAMS.contains(&b.name.as_str());
        b_priority.cmp(&a_priority).then_with(|| a.name.cmp(&b.name))
    });
    inputs.sort_by(|a, b| {
        b.required
            .cmp(&a.required)
            .then_with(|| match (a.kind, b.kind) {
                (InputType::Image, InputType::Text) => Ordering::Less,
                (InputType::Text, InputType::Image) => Ordering::Greater,
                _ => Ordering::Equal,
            })
            .then_with(|| a.name.cmp(&b.name))
    });

    ExtractedSchema { parameters, inputs }
}

/// Reads `latest_version.openapi_schema.components.schemas.Input`.
pub async fn fetch_replicate_schema(
    client: &Client,
    base: &str,
    key: &str,
    model_id: &str,
) -> Result<ExtractedSchema> {
    let resp = client
        .get(format!("{base}/models/{model_id}"))
        .bearer_auth(key)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(ProviderError::http(format!(
            "Replicate API error: {}",
            resp.status().as_u16()
        )));
    }
    let data: Value = resp
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))?;

    let Some(openapi) = data.pointer("/latest_version/openapi_schema") else {
        return Ok(ExtractedSchema::default());
    };
    let components = openapi
        .pointer("/components/schemas")
        .and_then(|v| v.as_object());
    match components.and_then(|c| c.get("Input")).filter(|v| v.is_object()) {
        Some(input) => Ok(extract_schema(input, components)),
        None => Ok(ExtractedSchema::default()),
    }
}

/// Looks the model up in the fal.ai catalog. Any failure yields an empty
/// schema so generation keeps working without a parameter panel.
pub async fn fetch_fal_schema(
    client: &Client,
    catalog: &str,
    key: Option<&str>,
    model_id: &str,
) -> ExtractedSchema {
    let mut req = client
        .get(format!("{catalog}/models"))
        .query(&[("endpoint_id", model_id), ("expand", "openapi-3.0")]);
    if let Some(key) = key {
        req = req.header(reqwest::header::AUTHORIZATION, format!("Key {key}"));
    }

    let data: Value = match req.send().await {
        Ok(resp) if resp.status().is_success() => match resp.json().await {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(model = model_id, error = %err, "unreadable fal.ai catalog response");
                return ExtractedSchema::default();
            }
        },
        Ok(resp) => {
            tracing::warn!(model = model_id, status = resp.status().as_u16(), "fal.ai catalog lookup failed");
            return ExtractedSchema::default();
        }
        Err(err) => {
            tracing::warn!(model = model_id, error = %err, "fal.ai catalog unreachable");
            return ExtractedSchema::default();
        }
    };

    let Some(openapi) = data.pointer("/models/0/openapi") else {
        return ExtractedSchema::default();
    };
    let components = openapi
        .pointer("/components/schemas")
        .and_then(|v| v.as_object());
    match fal_input_schema(openapi, components) {
        Some(input) => extract_schema(input, components),
        None => ExtractedSchema::default(),
    }
}

/// First POST request body schema under `paths`, following a `$ref`.
fn fal_input_schema<'a>(openapi: &'a Value, components: Option<&'a Map<String, Value>>) -> Option<&'a Value> {
    let paths = openapi.get("paths")?.as_object()?;
    for path in paths.values() {
        let Some(schema) = path.pointer("/post/requestBody/content/application~1json/schema") else {
            continue;
        };
        if let Some(reference) = schema.get("$ref").and_then(|v| v.as_str()) {
            let name = reference.trim_start_matches("#/components/schemas/");
            if let Some(resolved) = components.and_then(|c| c.get(name)) {
                return Some(resolved);
            }
        } else if schema.get("properties").is_some() {
            return Some(schema);
        }
    }
    None
}

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone)]
struct SchemaCacheEntry {
    schema: ExtractedSchema,
    stored_at: Instant,
}

/// Process-wide schema cache keyed by `provider:modelId`.
///
/// Concurrent writers for the same key simply overwrite each other.
#[derive(Clone)]
pub struct SchemaCache {
    entries: Arc<DashMap<String, SchemaCacheEntry>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), SCHEMA_TTL)
    }
}

impl SchemaCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            ttl,
        }
    }

    pub fn key(provider: &str, model_id: &str) -> String {
        format!("{provider}:{model_id}")
    }

    pub fn get(&self, key: &str) -> Option<ExtractedSchema> {
        let now = self.clock.now();
        let fresh = self.entries.get(key).and_then(|entry| {
            (now.duration_since(entry.stored_at) < self.ttl).then(|| entry.schema.clone())
        });
        if fresh.is_none() {
            self.entries.remove_if(key, |_, entry| {
                now.duration_since(entry.stored_at) >= self.ttl
            });
        }
        fresh
    }

    pub fn insert(&self, key: String, schema: ExtractedSchema) {
        let stored_at = self.clock.now();
        self.entries.insert(key, SchemaCacheEntry { schema, stored_at });
    }

    /// Drops one entry, or everything when `key` is `None`.
    pub fn invalidate(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn image_input_patterns() {
        for name in ["image", "first_frame", "start_image", "image_urls", "tail_image_url"] {
            assert!(is_image_input(name), "{name}");
        }
        for name in ["image_size", "num_images", "prompt", "imagery"] {
            assert!(!is_image_input(name), "{name}");
        }
    }

    #[test]
    fn labels() {
        assert_eq!(to_label("image_url"), "Image");
        assert_eq!(to_label("tail_image_url"), "Tail Image");
        assert_eq!(to_label("negative_prompt"), "Negative Prompt");
    }

    #[test]
    fn properties_are_classified_and_sorted() {
        let schema = json!({
            "type": "object",
            "required": ["prompt"],
            "properties": {
                "prompt": { "type": "string", "description": "What to draw" },
                "image": { "type": "string", "format": "uri" },
                "negative_prompt": { "type": "string" },
                "aspect_ratio": { "type": "string", "enum": ["1:1", "16:9"], "default": "1:1" },
                "seed": { "type": "integer", "minimum": 0 },
                "go_fast": { "type": "boolean" },
                "output_format": { "type": "string" },
                "guidance": { "type": "number", "minimum": 0, "maximum": 10 }
            }
        });
        let extracted = extract_schema(&schema, None);

        let inputs: Vec<_> = extracted.inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(inputs, ["prompt", "image", "negative_prompt"]);
        assert_eq!(extracted.inputs[0].label, "Prompt");
        assert!(extracted.inputs[0].required);

        let params: Vec<_> = extracted.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, ["guidance", "seed", "aspect_ratio"]);
        let guidance = &extracted.parameters[0];
        assert_eq!(guidance.kind, ParameterType::Number);
        assert_eq!(guidance.maximum, Some(10.0));
        let aspect = &extracted.parameters[2];
        assert_eq!(aspect.enum_values, Some(vec![json!("1:1"), json!("16:9")]));
        assert_eq!(aspect.default, Some(json!("1:1")));
    }

    #[test]
    fn all_of_refs_are_resolved() {
        let components = json!({
            "Scheduler": {
                "type": "string",
                "enum": ["DDIM", "K_EULER"],
                "default": "K_EULER",
                "description": "Sampler"
            },
            "Steps": { "type": "integer" }
        });
        let schema = json!({
            "properties": {
                "scheduler": { "allOf": [{ "$ref": "#/components/schemas/Scheduler" }] },
                "steps": { "allOf": [{ "$ref": "#/components/schemas/Steps" }], "default": 30 }
            }
        });
        let extracted = extract_schema(&schema, components.as_object());
        let scheduler = extracted
            .parameters
            .iter()
            .find(|p| p.name == "scheduler")
            .unwrap();
        assert_eq!(scheduler.kind, ParameterType::String);
        assert_eq!(scheduler.default, Some(json!("K_EULER")));
        assert_eq!(scheduler.description.as_deref(), Some("Sampler"));
        assert_eq!(scheduler.enum_values.as_ref().map(Vec::len), Some(2));
        let steps = extracted.parameters.iter().find(|p| p.name == "steps").unwrap();
        assert_eq!(steps.kind, ParameterType::Integer);
        assert_eq!(steps.default, Some(json!(30)));
    }

    #[test]
    fn serialized_parameter_uses_wire_names() {
        let param = ModelParameter {
            name: "mode".into(),
            kind: ParameterType::String,
            description: None,
            default: None,
            required: false,
            minimum: None,
            maximum: None,
            enum_values: Some(vec![json!("a")]),
        };
        assert_eq!(
            serde_json::to_value(param).unwrap(),
            json!({ "name": "mode", "type": "string", "required": false, "enum": ["a"] })
        );
    }

    #[test]
    fn fal_request_body_ref_is_followed() {
        let openapi = json!({
            "paths": {
                "/fal-ai/flux/dev": { "post": { "requestBody": { "content": { "application/json": {
                    "schema": { "$ref": "#/components/schemas/FluxInput" }
                } } } } }
            },
            "components": { "schemas": {
                "FluxInput": { "properties": { "prompt": { "type": "string" } } }
            } }
        });
        let components = openapi.pointer("/components/schemas").and_then(|v| v.as_object());
        let input = fal_input_schema(&openapi, components).unwrap();
        assert!(input.pointer("/properties/prompt").is_some());
    }

    #[test]
    fn cache_entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock(Mutex::new(Instant::now())));
        let cache = SchemaCache::new(clock.clone(), SCHEMA_TTL);
        let key = SchemaCache::key("fal", "fal-ai/flux/dev");
        cache.insert(key.clone(), ExtractedSchema::default());

        clock.advance(Duration::from_secs(9 * 60));
        assert!(cache.get(&key).is_some());

        clock.advance(Duration::from_secs(60));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_single_or_all() {
        let cache = SchemaCache::default();
        cache.insert("fal:a".into(), ExtractedSchema::default());
        cache.insert("fal:b".into(), ExtractedSchema::default());
        cache.invalidate(Some("fal:a"));
        assert_eq!(cache.len(), 1);
        cache.invalidate(None);
        assert!(cache.is_empty());
    }
}
