//! Storage traits and error types
//!
//! The crawler hands every finished page to a [`ResultSink`]. The sink owns diffing
//! against earlier crawls; the crawler never reads back what it stored.

use crate::crawler::ExtractionResult;
use crate::storage::RunStatus;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What recording one crawl wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub crawl_id: i64,
    /// Names of the data points whose value changed since the previous crawl
    pub changed_data_points: Vec<String>,
}

/// Destination for crawl results
pub trait ResultSink {
    /// Opens a crawl run and returns its ID
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file the run was started with
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Stores one crawl of the page identified by `page_key`
    ///
    /// Data point values are diffed against the latest stored value for the same page
    /// and name; only changes produce a new row.
    fn record(
        &mut self,
        run_id: Option<i64>,
        page_key: &str,
        result: &ExtractionResult,
    ) -> StorageResult<RecordOutcome>;

    /// Closes a crawl run with its final status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;
}
