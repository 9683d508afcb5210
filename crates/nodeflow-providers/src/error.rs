use crate::types::{Failure, FailureCategory};
use thiserror::Error;

/// Transport-level failures. Expected "nothing usable came back" outcomes are
/// reported as [`crate::types::Failure`] values instead.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("missing api key for provider: {0}")]
    MissingApiKey(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ProviderError {
    pub fn http(msg: impl Into<String>) -> Self {
        ProviderError::Http(msg.into())
    }

    /// Whether the upstream signalled quota exhaustion.
    pub fn is_rate_limited(&self) -> bool {
        self.to_string().contains("429")
    }

    /// The message without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            ProviderError::Config(msg)
            | ProviderError::MissingApiKey(msg)
            | ProviderError::Http(msg)
            | ProviderError::Parse(msg)
            | ProviderError::Unsupported(msg) => msg,
        }
    }

    /// Classify an error that escaped an adapter. The message is the upstream
    /// text alone, without the variant prefix.
    pub fn to_failure(&self) -> Failure {
        let category = if self.is_rate_limited() {
            FailureCategory::RateLimited
        } else {
            FailureCategory::Unknown
        };
        Failure::new(category, self.detail())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection_uses_message_text() {
        assert!(ProviderError::http("http 429: Too Many Requests").is_rate_limited());
        assert!(!ProviderError::http("http 500: boom").is_rate_limited());
        assert!(!ProviderError::Parse("expected value".into()).is_rate_limited());
    }

    #[test]
    fn failure_keeps_the_message() {
        let failure = ProviderError::http("Error: 429 Too Many Requests").to_failure();
        assert_eq!(failure.category, FailureCategory::RateLimited);
        let failure = ProviderError::Parse("eof".into()).to_failure();
        assert_eq!(failure.category, FailureCategory::Unknown);
        assert_eq!(failure.message, "eof");
    }

    #[test]
    fn failure_message_drops_the_variant_prefix() {
        let failure = ProviderError::http("http 502: Bad Gateway").to_failure();
        assert_eq!(failure.category, FailureCategory::Unknown);
        assert_eq!(failure.message, "http 502: Bad Gateway");
        assert!(!failure.message.starts_with("http error:"));
    }
}
