use crate::hosted::HostedImages;
use anyhow::{Context, Result};
use nodeflow_core::config::Config;
use nodeflow_core::types::ProviderId;
use nodeflow_providers::{Gateway, ProviderConfig, SchemaCache};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Gateway,
    pub schema_cache: SchemaCache,
    pub hosted_images: HostedImages,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let mut gateway = Gateway::new().context("build http client")?;
        for (name, provider) in &config.providers {
            let id: ProviderId = match name.parse() {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(provider = %name, %err, "ignoring config for unknown provider");
                    continue;
                }
            };
            gateway = gateway.with_provider(
                id,
                ProviderConfig {
                    base_url: provider.base_url.clone(),
                    catalog_url: provider.catalog_url.clone(),
                    api_key_env: provider.api_key_env.clone(),
                    ..Default::default()
                },
            );
        }

        Ok(Self {
            config: Arc::new(config),
            gateway,
            schema_cache: SchemaCache::default(),
            hosted_images: HostedImages::default(),
            started_at: Instant::now(),
        })
    }
}
