use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::error::{ProviderError, Result};
use nodeflow_core::types::ProviderId;
use std::env;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const REPLICATE_BASE_URL: &str = "https://api.replicate.com/v1";
pub const FAL_BASE_URL: &str = "https://fal.run";
pub const FAL_CATALOG_URL: &str = "https://api.fal.ai/v1";

/// Provider settings after merging user overrides onto the built-in defaults.
pub fn resolve_provider(provider: ProviderId, config: &Config) -> ProviderConfig {
    let defaults = default_provider_config(provider);
    match config.providers.get(&provider) {
        Some(user) => user.clone().or(defaults),
        None => defaults,
    }
}

pub fn default_provider_config(provider: ProviderId) -> ProviderConfig {
    let cfg = ProviderConfig::default().with_kind(ProviderKind::from(provider));
    match provider {
        ProviderId::Gemini => cfg
            .with_base_url(GEMINI_BASE_URL)
            .with_api_key_env("GEMINI_API_KEY"),
        ProviderId::Replicate => cfg
            .with_base_url(REPLICATE_BASE_URL)
            .with_api_key_env("REPLICATE_API_KEY"),
        ProviderId::Fal => cfg
            .with_base_url(FAL_BASE_URL)
            .with_catalog_url(FAL_CATALOG_URL)
            .with_api_key_env("FAL_API_KEY"),
    }
}

pub fn base_url(cfg: &ProviderConfig) -> Result<&str> {
    cfg.base_url
        .as_deref()
        .map(|b| b.trim_end_matches('/'))
        .ok_or_else(|| ProviderError::Config("base_url required".into()))
}

/// Server-held key: explicit value first, then the configured env var.
pub fn configured_api_key(cfg: &ProviderConfig) -> Option<String> {
    if let Some(key) = cfg.api_key.clone().filter(|k| !k.is_empty()) {
        return Some(key);
    }
    cfg.api_key_env
        .as_deref()
        .and_then(|name| env::var(name).ok())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_provider() {
        let config = Config::default();
        let fal = resolve_provider(ProviderId::Fal, &config);
        assert_eq!(fal.kind, ProviderKind::Fal);
        assert_eq!(fal.base_url.as_deref(), Some(FAL_BASE_URL));
        assert_eq!(fal.catalog_url.as_deref(), Some(FAL_CATALOG_URL));
        let replicate = resolve_provider(ProviderId::Replicate, &config);
        assert_eq!(replicate.api_key_env.as_deref(), Some("REPLICATE_API_KEY"));
    }

    #[test]
    fn user_override_keeps_unset_defaults() {
        let mut config = Config::default();
        config.providers.insert(
            ProviderId::Replicate,
            ProviderConfig::default().with_base_url("http://127.0.0.1:9000/"),
        );
        let resolved = resolve_provider(ProviderId::Replicate, &config);
        assert_eq!(base_url(&resolved).unwrap(), "http://127.0.0.1:9000");
        assert_eq!(resolved.api_key_env.as_deref(), Some("REPLICATE_API_KEY"));
        assert_eq!(resolved.kind, ProviderKind::Replicate);
    }

    #[test]
    fn explicit_key_wins_over_env() {
        let cfg = ProviderConfig::default()
            .with_api_key("inline")
            .with_api_key_env("NODEFLOW_TEST_UNSET_KEY");
        assert_eq!(configured_api_key(&cfg).as_deref(), Some("inline"));
        let cfg = ProviderConfig::default().with_api_key_env("NODEFLOW_TEST_UNSET_KEY");
        assert_eq!(configured_api_key(&cfg), None);
    }
}
