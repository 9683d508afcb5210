//! Short-lived URLs for large input images.
//!
//! Replicate and fal accept either a data URL or a link for image inputs, but
//! large data URLs are rejected upstream. Those images are parked here, served
//! from `/api/images/{id}` and released when the generation that needed them
//! finishes.

use dashmap::DashMap;
use nodeflow_core::media::InlineData;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

const ID_LEN: usize = 16;

pub const HOSTED_IMAGE_ROUTE: &str = "/api/images";

#[derive(Debug, Clone)]
pub struct HostedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct HostedImages {
    images: Arc<DashMap<String, HostedImage>>,
}

impl HostedImages {
    pub fn get(&self, id: &str) -> Option<HostedImage> {
        self.images.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Parks a decoded data URL and returns its id. Anything that is not a
    /// well-formed base64 data URL is left to travel inline.
    pub fn host(&self, data_url: &str) -> Option<String> {
        let inline = InlineData::parse_data_url(data_url)?;
        let bytes = inline.decode().ok()?;
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_LEN)
            .map(char::from)
            .collect();
        self.images.insert(
            id.clone(),
            HostedImage {
                mime_type: inline.mime_type,
                bytes,
            },
        );
        Some(id)
    }

    pub fn remove(&self, ids: &[String]) {
        for id in ids {
            self.images.remove(id);
        }
    }

    /// Swaps every data URL longer than `threshold` bytes for a link under
    /// `base_url`. The returned guard releases the hosted copies on drop.
    pub fn stage(&self, images: &mut [String], base_url: &str, threshold: usize) -> HostedGuard {
        let mut ids = Vec::new();
        for image in images.iter_mut() {
            if image.len() <= threshold {
                continue;
            }
            if let Some(id) = self.host(image) {
                tracing::info!(id = %id, size = image.len(), "serving large input image by url");
                *image = format!("{}{}/{}", base_url.trim_end_matches('/'), HOSTED_IMAGE_ROUTE, id);
                ids.push(id);
            }
        }
        HostedGuard {
            images: self.clone(),
            ids,
        }
    }
}

/// Releases staged images when the request that staged them ends, whether it
/// succeeded, failed or was cancelled.
#[derive(Debug)]
pub struct HostedGuard {
    images: HostedImages,
    ids: Vec<String>,
}

impl HostedGuard {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl Drop for HostedGuard {
    fn drop(&mut self) {
        if !self.ids.is_empty() {
            self.images.remove(&self.ids);
            tracing::debug!(count = self.ids.len(), "released hosted images");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::media::encode_data_url;

    #[test]
    fn only_large_data_urls_are_hosted() {
        let hosted = HostedImages::default();
        let mut images = vec![
            encode_data_url("image/jpeg", &[1u8; 300]),
            encode_data_url("image/png", &[2u8; 3]),
            "https://cdn.example.com/a.png".repeat(20),
        ];

        let guard = hosted.stage(&mut images, "http://localhost:3000/", 100);
        assert_eq!(guard.ids().len(), 1);
        let id = &guard.ids()[0];
        assert_eq!(images[0], format!("http://localhost:3000/api/images/{id}"));
        assert!(images[1].starts_with("data:image/png"));
        assert!(images[2].starts_with("https://cdn.example.com"));

        let image = hosted.get(id).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, vec![1u8; 300]);
    }

    #[test]
    fn dropping_the_guard_releases_images() {
        let hosted = HostedImages::default();
        let mut images = vec![encode_data_url("image/png", &[0u8; 64])];
        {
            let _guard = hosted.stage(&mut images, "http://h", 10);
            assert_eq!(hosted.len(), 1);
        }
        assert!(hosted.is_empty());
    }

    #[test]
    fn undecodable_payload_stays_inline() {
        let hosted = HostedImages::default();
        let bad = format!("data:image/png;base64,{}", "!".repeat(50));
        let mut images = vec![bad.clone()];
        let guard = hosted.stage(&mut images, "http://h", 10);
        assert!(guard.ids().is_empty());
        assert_eq!(images[0], bad);
    }
}
