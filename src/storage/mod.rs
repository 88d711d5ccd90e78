//! Storage for crawl output
//!
//! This module persists what the crawler produces:
//! - Screenshot blobs behind the [`BlobStore`] trait
//! - Crawl results and the data point change log through a [`ResultSink`]
//! - Crawl run bookkeeping

mod blob;
mod schema;
mod sqlite;
mod traits;

pub use blob::{BlobStore, LocalBlobStore, ScreenshotKind};
pub use schema::initialize_schema;
pub use sqlite::{CrawlStats, DataPointRecord, SqliteSink};
pub use traits::{RecordOutcome, ResultSink, StorageError, StorageResult};

use sha2::{Digest, Sha256};
use std::path::Path;

/// Opens or creates the SQLite result store at `path`
pub fn open_sink(path: &Path) -> StorageResult<SqliteSink> {
    SqliteSink::new(path)
}

/// Stable identifier for a page: the first 16 hex characters of the SHA-256 of its
/// normalized URL
///
/// # Examples
///
/// ```
/// use sitelens::storage::page_key;
///
/// let key = page_key("https://example.com/about");
/// assert_eq!(key.len(), 16);
/// assert_eq!(key, page_key("https://example.com/about"));
/// ```
pub fn page_key(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(16);
    key
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
