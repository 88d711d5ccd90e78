//! Blob storage for screenshots
//!
//! Blobs are named `{key}_{kind}.png`. Every operation degrades instead of failing:
//! a write error is logged and yields `None`, which callers treat as "screenshot
//! unavailable".

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Which viewport a screenshot was taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotKind {
    Desktop,
    Mobile,
}

impl ScreenshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "desktop" => Some(Self::Desktop),
            "mobile" => Some(Self::Mobile),
            _ => None,
        }
    }
}

/// Durable storage for binary artifacts
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes`, returning a reference to the stored blob or `None` on failure
    async fn save(&self, bytes: &[u8], key: &str, kind: ScreenshotKind) -> Option<String>;

    /// Removes a blob, returning true if it existed and was removed
    async fn delete(&self, key: &str, kind: ScreenshotKind) -> bool;

    /// Reference to a stored blob, if present
    async fn exists(&self, key: &str, kind: ScreenshotKind) -> Option<String>;

    /// Removes every blob whose key is not in `valid_keys`, returning how many were removed
    async fn cleanup_orphaned(&self, valid_keys: &HashSet<String>) -> usize;
}

/// Keys become file names, so only a conservative alphabet is accepted
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Blob store on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Creates a store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name for a blob: `{key}_{kind}.png`
    pub fn file_name(key: &str, kind: ScreenshotKind) -> String {
        format!("{}_{}.png", key, kind.as_str())
    }

    fn path_for(&self, key: &str, kind: ScreenshotKind) -> Option<PathBuf> {
        if !is_valid_key(key) {
            tracing::warn!("Rejecting blob key {:?}", key);
            return None;
        }
        Some(self.root.join(Self::file_name(key, kind)))
    }

    fn reference(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, bytes: &[u8], key: &str, kind: ScreenshotKind) -> Option<String> {
        let path = self.path_for(key, kind)?;

        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::error!("Failed to create blob directory {}: {}", self.root.display(), e);
            return None;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                tracing::debug!("Saved {} bytes to {}", bytes.len(), path.display());
                Some(Self::reference(&path))
            }
            Err(e) => {
                tracing::error!("Failed to write blob {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn delete(&self, key: &str, kind: ScreenshotKind) -> bool {
        let Some(path) = self.path_for(key, kind) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete blob {}: {}", path.display(), e);
                false
            }
        }
    }

    async fn exists(&self, key: &str, kind: ScreenshotKind) -> Option<String> {
        let path = self.path_for(key, kind)?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(Self::reference(&path)),
            _ => None,
        }
    }

    async fn cleanup_orphaned(&self, valid_keys: &HashSet<String>) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to list {}: {}", self.root.display(), e);
                }
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read entry in {}: {}", self.root.display(), e);
                    break;
                }
            };

            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some((key, kind)) = file_name
                .strip_suffix(".png")
                .and_then(|stem| stem.rsplit_once('_'))
            else {
                continue;
            };
            if ScreenshotKind::from_str_opt(kind).is_none() || valid_keys.contains(key) {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove orphaned blob {}: {}", file_name, e),
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} orphaned screenshots", removed);
        }
        removed
    }
}
