use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::error::{ProviderError, Result};
use crate::http::{fetch_bytes, FetchedBody};
use crate::poller::Poller;
use crate::providers::{fal, gemini, replicate};
use crate::router::{base_url, resolve_provider};
use crate::schema::{fetch_fal_schema, fetch_replicate_schema, ExtractedSchema};
use crate::types::{Credentials, GenerationRequest, GenerationResult};
use nodeflow_core::types::ProviderId;
use reqwest::Client;
use std::time::Duration;

/// Upper bound for a single upstream HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Dispatches canonical generation requests to the matching adapter.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Config,
    client: Client,
    poller: Poller,
}

impl Gateway {
    pub fn new() -> Result<Self> {
        Ok(Self {
            config: Config::default(),
            client: Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .map_err(ProviderError::from)?,
            poller: Poller::default(),
        })
    }

    pub fn with_provider(mut self, provider: ProviderId, config: ProviderConfig) -> Self {
        self.config.providers.insert(provider, config);
        self
    }

    pub fn provider_config(&self, provider: ProviderId) -> ProviderConfig {
        resolve_provider(provider, &self.config)
    }

    pub async fn generate(
        &self,
        req: GenerationRequest,
        creds: &Credentials,
    ) -> Result<GenerationResult> {
        let cfg = self.provider_config(req.model.provider);
        match cfg.kind {
            ProviderKind::Gemini => gemini::generate(&self.client, &cfg, req, creds).await,
            ProviderKind::Replicate => {
                replicate::generate(&self.client, &cfg, &self.poller, req, creds).await
            }
            ProviderKind::Fal => fal::generate(&self.client, &cfg, req, creds).await,
        }
    }

    /// Parameter schema for a Replicate or fal.ai model.
    pub async fn model_schema(
        &self,
        provider: ProviderId,
        model_id: &str,
        creds: &Credentials,
    ) -> Result<ExtractedSchema> {
        let cfg = self.provider_config(provider);
        match cfg.kind {
            ProviderKind::Replicate => {
                let key = creds
                    .api_key
                    .as_deref()
                    .ok_or_else(|| ProviderError::MissingApiKey("replicate".into()))?;
                fetch_replicate_schema(&self.client, base_url(&cfg)?, key, model_id).await
            }
            ProviderKind::Fal => {
                let catalog = cfg
                    .catalog_url
                    .as_deref()
                    .map(|c| c.trim_end_matches('/'))
                    .ok_or_else(|| ProviderError::Config("catalog_url required".into()))?;
                Ok(fetch_fal_schema(&self.client, catalog, creds.api_key.as_deref(), model_id).await)
            }
            ProviderKind::Gemini => Err(ProviderError::Unsupported(
                "model schemas are only published by replicate and fal".into(),
            )),
        }
    }

    /// Plain download used when persisting media referenced by URL.
    pub async fn download(&self, url: &str) -> Result<FetchedBody> {
        fetch_bytes(self.client.get(url)).await
    }
}
