use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GEMINI_MODEL: &str = "nano-banana-pro";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerSettings,
    pub defaults: Defaults,
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub request_timeout_secs: u64,
    pub max_body_size_mb: usize,
    /// Input data URLs longer than this are handed to providers by URL.
    pub hosted_image_threshold_kb: usize,
    /// Origin providers use to reach this server. Falls back to the request's
    /// `Host` header.
    pub public_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            request_timeout_secs: 600,
            max_body_size_mb: 100,
            hosted_image_threshold_kb: 256,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Defaults {
    pub gemini_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub catalog_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    pub server: Option<ServerFile>,
    pub defaults: Option<Defaults>,
    pub providers: Option<HashMap<String, ProviderConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ServerFile {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_json: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub max_body_size_mb: Option<usize>,
    pub hosted_image_threshold_kb: Option<usize>,
    pub public_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with_profile(None)
    }

    pub fn load_with_profile(profile: Option<&str>) -> Result<Self> {
        let mut config = Config::default();
        for path in default_config_paths(profile) {
            if path.exists() {
                let file = load_config_file(&path)?;
                config.merge(file);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("parse config")?;
        let mut config = Config::default();
        config.merge(file);
        Ok(config)
    }

    pub fn gemini_model(&self) -> &str {
        self.defaults
            .gemini_model
            .as_deref()
            .unwrap_or(DEFAULT_GEMINI_MODEL)
    }

    fn merge(&mut self, other: ConfigFile) {
        if let Some(server) = other.server {
            merge_server(&mut self.server, server);
        }
        if let Some(defaults) = other.defaults {
            if defaults.gemini_model.is_some() {
                self.defaults.gemini_model = defaults.gemini_model;
            }
        }
        if let Some(providers) = other.providers {
            for (k, v) in providers {
                self.providers
                    .entry(k)
                    .and_modify(|existing| merge_provider(existing, &v))
                    .or_insert(v);
            }
        }
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let parsed: ConfigFile =
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    Ok(parsed)
}

fn default_config_paths(profile: Option<&str>) -> Vec<PathBuf> {
    let home = home_dir();
    let xdg = env::var("XDG_CONFIG_HOME").ok().map(PathBuf::from);

    let mut paths = Vec::new();
    if let Some(home) = &home {
        paths.push(home.join(".nodeflow/config.toml"));
        paths.push(home.join(".config/nodeflow/config.toml"));
    }
    if let Some(xdg) = &xdg {
        paths.push(xdg.join("nodeflow/config.toml"));
    }
    paths.push(PathBuf::from("./nodeflow.toml"));

    if let Ok(custom) = env::var("NODEFLOW_CONFIG_PATH") {
        paths.push(PathBuf::from(custom));
    }

    if let Some(name) = profile {
        let file = format!("{name}.toml");
        if let Some(home) = &home {
            paths.push(home.join(".nodeflow/profiles").join(&file));
            paths.push(home.join(".config/nodeflow/profiles").join(&file));
        }
        if let Some(xdg) = &xdg {
            paths.push(xdg.join("nodeflow/profiles").join(&file));
        }
        paths.push(PathBuf::from(format!("./nodeflow.{name}.toml")));
    }
    paths
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn merge_server(target: &mut ServerSettings, other: ServerFile) {
    if let Some(bind_addr) = other.bind_addr {
        target.bind_addr = bind_addr;
    }
    if let Some(port) = other.port {
        target.port = port;
    }
    if let Some(log_level) = other.log_level {
        target.log_level = log_level;
    }
    if let Some(log_json) = other.log_json {
        target.log_json = log_json;
    }
    if let Some(timeout) = other.request_timeout_secs {
        target.request_timeout_secs = timeout;
    }
    if let Some(max_body) = other.max_body_size_mb {
        target.max_body_size_mb = max_body;
    }
    if let Some(threshold) = other.hosted_image_threshold_kb {
        target.hosted_image_threshold_kb = threshold;
    }
    if other.public_url.is_some() {
        target.public_url = other.public_url;
    }
}

fn merge_provider(target: &mut ProviderConfig, other: &ProviderConfig) {
    if other.base_url.is_some() {
        target.base_url = other.base_url.clone();
    }
    if other.api_key_env.is_some() {
        target.api_key_env = other.api_key_env.clone();
    }
    if other.catalog_url.is_some() {
        target.catalog_url = other.catalog_url.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout_secs, 600);
        assert_eq!(config.gemini_model(), "nano-banana-pro");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn later_files_override_earlier_fields() {
        let mut config = Config::from_toml_str(
            r#"
            [server]
            port = 4000
            log_level = "debug"

            [providers.replicate]
            base_url = "http://localhost:9000"
            api_key_env = "MY_REPLICATE"
            "#,
        )
        .unwrap();

        let overlay: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 5000

            [defaults]
            gemini_model = "nano-banana"

            [providers.replicate]
            base_url = "http://localhost:9100"
            "#,
        )
        .unwrap();
        config.merge(overlay);

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.gemini_model(), "nano-banana");
        let replicate = &config.providers["replicate"];
        assert_eq!(replicate.base_url.as_deref(), Some("http://localhost:9100"));
        assert_eq!(replicate.api_key_env.as_deref(), Some("MY_REPLICATE"));
    }

    #[test]
    fn hosted_image_settings_are_optional() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.hosted_image_threshold_kb, 256);
        assert!(config.server.public_url.is_none());

        let config = Config::from_toml_str(
            r#"
            [server]
            hosted_image_threshold_kb = 64
            public_url = "https://nodes.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.hosted_image_threshold_kb, 64);
        assert_eq!(config.server.public_url.as_deref(), Some("https://nodes.example.com"));
    }
}
