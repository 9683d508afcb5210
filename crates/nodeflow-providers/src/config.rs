use nodeflow_core::types::ProviderId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub providers: HashMap<ProviderId, ProviderConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    /// Model catalog used for schema lookups (fal.ai only).
    pub catalog_url: Option<String>,
    pub api_key_env: Option<String>,
    pub api_key: Option<String>,
    pub kind: ProviderKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    #[default]
    Gemini,
    Replicate,
    Fal,
}

impl From<ProviderId> for ProviderKind {
    fn from(id: ProviderId) -> Self {
        match id {
            ProviderId::Gemini => ProviderKind::Gemini,
            ProviderId::Replicate => ProviderKind::Replicate,
            ProviderId::Fal => ProviderKind::Fal,
        }
    }
}

impl ProviderConfig {
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = Some(url.into());
        self
    }

    pub fn with_api_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = Some(env.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fills unset fields from `fallback`.
    pub fn or(mut self, fallback: ProviderConfig) -> Self {
        if self.base_url.is_none() {
            self.base_url = fallback.base_url;
        }
        if self.catalog_url.is_none() {
            self.catalog_url = fallback.catalog_url;
        }
        if self.api_key_env.is_none() {
            self.api_key_env = fallback.api_key_env;
        }
        if self.api_key.is_none() {
            self.api_key = fallback.api_key;
        }
        self.kind = fallback.kind;
        self
    }
}
