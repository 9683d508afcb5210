use crate::error::{ProviderError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Response;

/// Number of body lines kept in an HTTP error message.
const ERROR_BODY_LINES: usize = 20;

/// Send a JSON request and parse the response.
///
/// Non-2xx responses become [`ProviderError::Http`] carrying the status code,
/// so callers can detect rate limiting from the message.
pub async fn send_json<T: serde::de::DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<(T, HeaderMap)> {
    let resp = checked(req.send().await?).await?;
    let headers = resp.headers().clone();
    let parsed = resp
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok((parsed, headers))
}

/// Bytes fetched from a media URL.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Download a body without interpreting it.
pub async fn fetch_bytes(req: reqwest::RequestBuilder) -> Result<FetchedBody> {
    let resp = checked(req.send().await?).await?;
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|v| !v.is_empty());
    let bytes = resp.bytes().await?;
    Ok(FetchedBody {
        bytes,
        content_type,
    })
}

async fn checked(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let trimmed = text
        .lines()
        .take(ERROR_BODY_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    Err(ProviderError::http(format!(
        "http {}: {}",
        status.as_u16(),
        trimmed
    )))
}
