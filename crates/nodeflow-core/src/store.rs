//! Content-addressed persistence of generated media.
//!
//! Files are named `<stem>_<md5>.<ext>` inside a caller-chosen directory. The
//! directory listing is the only index: every save rescans it for a file with
//! the same hash suffix, so deduplication keeps working across restarts.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::media::{mime_for_extension, MediaKind, LOOKUP_EXTENSIONS};

const STEM_PROMPT_CHARS: usize = 30;
const FALLBACK_STEM: &str = "generation";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Directory does not exist")]
    DirectoryMissing(PathBuf),
    #[error("Path is not a directory")]
    NotADirectory(PathBuf),
    #[error("File not found")]
    NotFound(String),
    #[error("Invalid image id")]
    InvalidId(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }
}

/// A file persisted by [`save`], or the existing file it deduplicated to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredArtifact {
    pub directory: PathBuf,
    pub file_path: PathBuf,
    pub filename: String,
    pub content_hash: String,
    pub extension: String,
    pub logical_id: String,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub file_path: PathBuf,
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
}

/// Hex-encoded MD5 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Filename stem derived from the first characters of a prompt.
pub fn prompt_stem(prompt: Option<&str>) -> String {
    let Some(prompt) = prompt.filter(|p| !p.is_empty()) else {
        return FALLBACK_STEM.to_string();
    };
    let mut stem = String::with_capacity(STEM_PROMPT_CHARS);
    for c in prompt.chars().take(STEM_PROMPT_CHARS) {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let trimmed = stem.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn ensure_directory(dir: &Path) -> Result<(), StoreError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StoreError::NotADirectory(dir.to_path_buf())),
        Err(_) => Err(StoreError::DirectoryMissing(dir.to_path_buf())),
    }
}

/// Name of an existing file in `dir` ending in `_<hash>.<extension>`.
pub fn find_by_hash(dir: &Path, hash: &str, extension: &str) -> Result<Option<String>, StoreError> {
    let suffix = format!("_{hash}.{extension}");
    let entries =
        fs::read_dir(dir).map_err(|e| StoreError::io(format!("read {}", dir.display()), e))?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("read {}", dir.display()), e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(&suffix) {
            matches.push(name);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Persist `bytes` into `dir`, or resolve to an existing file with identical content.
pub fn save(
    dir: &Path,
    bytes: &[u8],
    extension: &str,
    prompt: Option<&str>,
) -> Result<StoredArtifact, StoreError> {
    ensure_directory(dir)?;
    let hash = content_hash(bytes);

    if let Some(existing) = find_by_hash(dir, &hash, extension)? {
        tracing::info!(
            content_hash = %hash,
            filename = %existing,
            "generation deduplicated against existing file"
        );
        return Ok(artifact(dir, existing, hash, extension, true));
    }

    let filename = format!("{}_{}.{}", prompt_stem(prompt), hash, extension);
    let path = dir.join(&filename);
    write_atomic(dir, &path, bytes)?;
    tracing::info!(
        file_path = %path.display(),
        file_size = bytes.len(),
        content_hash = %hash,
        "generation saved"
    );
    Ok(artifact(dir, filename, hash, extension, false))
}

/// Read the artifact named `<logical_id>.<ext>` for the first extension that exists.
pub fn load(dir: &Path, logical_id: &str) -> Result<LoadedArtifact, StoreError> {
    if !is_plain_id(logical_id) {
        return Err(StoreError::InvalidId(logical_id.to_string()));
    }
    ensure_directory(dir)?;
    for ext in LOOKUP_EXTENSIONS {
        let candidate = dir.join(format!("{logical_id}.{ext}"));
        if !candidate.is_file() {
            continue;
        }
        let bytes = fs::read(&candidate)
            .map_err(|e| StoreError::io(format!("read {}", candidate.display()), e))?;
        return Ok(LoadedArtifact {
            file_path: candidate,
            extension: ext,
            mime_type: mime_for_extension(ext),
            kind: MediaKind::from_extension(ext),
            bytes,
        });
    }
    Err(StoreError::NotFound(logical_id.to_string()))
}

/// A logical id must name a file directly inside the store directory.
fn is_plain_id(logical_id: &str) -> bool {
    !logical_id.is_empty()
        && !logical_id.contains(['/', '\\'])
        && !logical_id.contains("..")
}

fn artifact(
    dir: &Path,
    filename: String,
    content_hash: String,
    extension: &str,
    is_duplicate: bool,
) -> StoredArtifact {
    let logical_id = filename
        .strip_suffix(&format!(".{extension}"))
        .unwrap_or(&filename)
        .to_string();
    StoredArtifact {
        directory: dir.to_path_buf(),
        file_path: dir.join(&filename),
        filename,
        content_hash,
        extension: extension.to_string(),
        logical_id,
        is_duplicate,
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::io(format!("create temp file in {}", dir.display()), e))?;
    tmp.write_all(bytes)
        .map_err(|e| StoreError::io(format!("write {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(format!("persist {}", path.display()), e.error))?;
    Ok(())
}
