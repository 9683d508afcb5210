use crate::config::ProviderConfig;
use crate::router::configured_api_key;
use crate::types::Credentials;

pub mod fal;
pub mod gemini;
pub mod replicate;

/// A key supplied with the request wins over the server-held one.
pub fn resolve_credentials(cfg: &ProviderConfig, supplied: Option<&str>) -> Credentials {
    match supplied.filter(|k| !k.is_empty()) {
        Some(key) => Credentials::new(key),
        None => Credentials::from_optional(configured_api_key(cfg)),
    }
}
