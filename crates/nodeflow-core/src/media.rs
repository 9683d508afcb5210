use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_MIME: &str = "image/png";
pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Extensions tried, in order, when loading an artifact by logical id.
pub const LOOKUP_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "webp", "gif", "mp4", "webm", "mov"];

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mov"];

/// Image or video media kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        if VIDEO_EXTENSIONS.contains(&ext) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn default_mime(self) -> &'static str {
        match self {
            MediaKind::Image => DEFAULT_IMAGE_MIME,
            MediaKind::Video => DEFAULT_VIDEO_MIME,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// A base64 payload together with the MIME type it was declared with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    /// Splits an image handed in by the editor into MIME type and payload.
    ///
    /// Anything after `base64,` is the payload and the MIME type is read from a
    /// `data:<mime>` header. Input without that marker is taken as bare base64
    /// and assumed to be PNG.
    pub fn from_image_input(input: &str) -> Self {
        match input.split_once("base64,") {
            Some((header, data)) => {
                let mime_type = header
                    .find("data:")
                    .map(|idx| &header[idx + 5..])
                    .and_then(|rest| rest.split(';').next())
                    .filter(|mime| !mime.is_empty())
                    .unwrap_or(DEFAULT_IMAGE_MIME);
                Self {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                }
            }
            None => Self {
                mime_type: DEFAULT_IMAGE_MIME.to_string(),
                data: input.to_string(),
            },
        }
    }

    /// Strict parse of `data:<mime>;base64,<payload>`.
    ///
    /// The MIME type may only contain word characters, `/`, `+` and `-`.
    pub fn parse_data_url(input: &str) -> Option<Self> {
        let rest = input.strip_prefix("data:")?;
        let (mime, data) = rest.split_once(";base64,")?;
        let valid = !mime.is_empty()
            && mime
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '+' | '-'));
        if !valid {
            return None;
        }
        Some(Self {
            mime_type: mime.to_string(),
            data: data.to_string(),
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        decode_base64(&self.data)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(data.trim())
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// File extension used when persisting content of the given MIME type.
///
/// Unknown types are written as `mp4`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match essence(mime) {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    }
}

/// MIME type served for a stored file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}
