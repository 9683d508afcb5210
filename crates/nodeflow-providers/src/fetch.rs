//! Download generated media and decide how it travels back to the editor.

use crate::error::Result;
use crate::http::{fetch_bytes, FetchedBody};
use crate::types::{GeneratedMedia, MediaPayload};
use nodeflow_core::media::{encode_data_url, MediaKind, DEFAULT_IMAGE_MIME, DEFAULT_VIDEO_MIME};
use reqwest::Client;

const MB: usize = 1024 * 1024;

/// Videos larger than this are returned by URL instead of inlined.
pub const INLINE_VIDEO_LIMIT: usize = 20 * MB;
/// Payloads larger than this are logged as oversized.
pub const OVERSIZED_WARNING: usize = 10 * MB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Inline,
    RemoteUrl,
}

/// `size` is compared strictly: exactly 20MB is still inlined.
pub fn payload_shape(kind: MediaKind, size: usize) -> PayloadShape {
    if kind == MediaKind::Video && size > INLINE_VIDEO_LIMIT {
        PayloadShape::RemoteUrl
    } else {
        PayloadShape::Inline
    }
}

pub fn is_oversized(size: usize) -> bool {
    size > OVERSIZED_WARNING
}

#[derive(Debug, Clone)]
pub struct EncodedMedia {
    pub media: GeneratedMedia,
    pub oversized: bool,
}

/// Turn a downloaded body into a [`GeneratedMedia`].
///
/// `video_hint` is set by adapters that know the endpoint produces video even
/// when the host reports a generic content type.
pub fn encode(url: &str, body: &FetchedBody, video_hint: bool) -> EncodedMedia {
    let mime_type = body.content_type.clone().unwrap_or_else(|| {
        if video_hint {
            DEFAULT_VIDEO_MIME.to_string()
        } else {
            DEFAULT_IMAGE_MIME.to_string()
        }
    });
    let kind = if mime_type.starts_with("video/") || video_hint {
        MediaKind::Video
    } else {
        MediaKind::Image
    };

    let size = body.bytes.len();
    let oversized = is_oversized(size);
    if oversized {
        tracing::warn!(
            url,
            size_mb = format!("{:.2}", size as f64 / MB as f64),
            "large output file"
        );
    }

    let payload = match payload_shape(kind, size) {
        PayloadShape::RemoteUrl => {
            tracing::info!(url, "video too large to inline, returning url");
            MediaPayload::Remote(url.to_string())
        }
        PayloadShape::Inline => MediaPayload::Inline(encode_data_url(&mime_type, &body.bytes)),
    };

    EncodedMedia {
        media: GeneratedMedia {
            kind,
            payload,
            mime_type,
            source_url: Some(url.to_string()),
        },
        oversized,
    }
}

pub async fn fetch_and_encode(client: &Client, url: &str, video_hint: bool) -> Result<EncodedMedia> {
    tracing::debug!(url, "fetching output");
    let body = fetch_bytes(client.get(url)).await?;
    Ok(encode(url, &body, video_hint))
}
