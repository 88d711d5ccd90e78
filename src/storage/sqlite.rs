//! SQLite result sink
//!
//! Stores every crawl as a `crawls` row and keeps `data_points` as a change log: a
//! value is written only when it differs from the latest stored value for the same
//! page and data point name.

use crate::crawler::ExtractionResult;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordOutcome, ResultSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Aggregate figures across everything stored
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStats {
    pub runs: u64,
    pub pages: u64,
    pub crawls: u64,
    pub successful_crawls: u64,
    pub failed_crawls: u64,
    pub data_point_changes: u64,
    /// Mean quality score over successful crawls
    pub average_quality: Option<f64>,
    /// Failed crawl count per error category
    pub failures_by_category: BTreeMap<String, u64>,
}

/// One stored value of a data point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPointRecord {
    pub crawl_id: i64,
    /// JSON-encoded value; `None` when the data point became absent
    pub value: Option<String>,
    pub recorded_at: String,
}

/// SQLite-backed [`ResultSink`]
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM crawl_runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Running),
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    /// Latest stored value of every data point recorded for a page
    ///
    /// Values are JSON-encoded; `None` marks a data point that became absent.
    pub fn latest_values(&self, page_key: &str) -> StorageResult<BTreeMap<String, Option<String>>> {
        let page_id = self.page_id(page_key)?;
        let mut stmt = self.conn.prepare(
            "
            SELECT d.name, d.value
            FROM data_points d
            WHERE d.page_id = ?1
              AND d.id = (
                  SELECT MAX(id) FROM data_points
                  WHERE page_id = d.page_id AND name = d.name
              )
            ORDER BY d.name
        ",
        )?;

        let rows = stmt.query_map(params![page_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut values = BTreeMap::new();
        for row in rows {
            let (name, value) = row?;
            values.insert(name, value);
        }
        Ok(values)
    }

    /// Every stored change of one data point, oldest first
    pub fn data_point_history(
        &self,
        page_key: &str,
        name: &str,
    ) -> StorageResult<Vec<DataPointRecord>> {
        let page_id = self.page_id(page_key)?;
        let mut stmt = self.conn.prepare(
            "SELECT crawl_id, value, recorded_at FROM data_points
             WHERE page_id = ?1 AND name = ?2 ORDER BY id",
        )?;

        let history = stmt
            .query_map(params![page_id, name], |row| {
                Ok(DataPointRecord {
                    crawl_id: row.get(0)?,
                    value: row.get(1)?,
                    recorded_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(history)
    }

    /// Aggregate statistics for the `--stats` report
    pub fn statistics(&self) -> StorageResult<CrawlStats> {
        let count = |sql: &str| -> StorageResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        let mut stats = CrawlStats {
            runs: count("SELECT COUNT(*) FROM crawl_runs")?,
            pages: count("SELECT COUNT(*) FROM pages")?,
            crawls: count("SELECT COUNT(*) FROM crawls")?,
            successful_crawls: count("SELECT COUNT(*) FROM crawls WHERE success = 1")?,
            failed_crawls: count("SELECT COUNT(*) FROM crawls WHERE success = 0")?,
            data_point_changes: count("SELECT COUNT(*) FROM data_points")?,
            ..CrawlStats::default()
        };

        stats.average_quality = self.conn.query_row(
            "SELECT AVG(quality_score) FROM crawls WHERE success = 1 AND quality_score IS NOT NULL",
            [],
            |row| row.get::<_, Option<f64>>(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(error_category, 'unknown'), COUNT(*)
             FROM crawls WHERE success = 0 GROUP BY 1 ORDER BY 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (category, n) = row?;
            stats.failures_by_category.insert(category, n as u64);
        }

        Ok(stats)
    }

    fn page_id(&self, page_key: &str) -> StorageResult<i64> {
        self.conn
            .query_row(
                "SELECT id FROM pages WHERE page_key = ?1",
                params![page_key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::PageNotFound(page_key.to_string()))
    }
}

fn upsert_page(tx: &Transaction<'_>, page_key: &str, url: &str, now: &str) -> StorageResult<i64> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM pages WHERE page_key = ?1",
            params![page_key],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        tx.execute(
            "UPDATE pages SET url = ?1, last_crawled_at = ?2 WHERE id = ?3",
            params![url, now, id],
        )?;
        return Ok(id);
    }

    tx.execute(
        "INSERT INTO pages (page_key, url, first_seen_at, last_crawled_at) VALUES (?1, ?2, ?3, ?3)",
        params![page_key, url, now],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_crawl(
    tx: &Transaction<'_>,
    page_id: i64,
    run_id: Option<i64>,
    result: &ExtractionResult,
) -> StorageResult<i64> {
    let (quality_score, issues, warnings) = match &result.validation {
        Some(report) => (
            Some(report.quality_score),
            Some(serde_json::to_string(&report.issues)?),
            Some(serde_json::to_string(&report.warnings)?),
        ),
        None => (None, None, None),
    };

    tx.execute(
        "INSERT INTO crawls (
            page_id, run_id, requested_url, final_url, success, status_code,
            error_category, error_message, quality_score, issues, warnings,
            dom_rendered_completely, retry_attempt, stealth, timeout_secs,
            screenshot, crawled_at, elapsed_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            page_id,
            run_id,
            result.requested_url,
            result.url,
            result.success,
            result.status_code,
            result.error_category.map(|c| c.as_str()),
            result.error_message,
            quality_score,
            issues,
            warnings,
            result.dom_rendered_completely,
            result.crawl_metadata.retry_attempt,
            result.crawl_metadata.stealth,
            result.crawl_metadata.timeout_secs,
            result.screenshot,
            result.crawled_at.to_rfc3339(),
            result.elapsed_ms as i64,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

impl ResultSink for SqliteSink {
    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record(
        &mut self,
        run_id: Option<i64>,
        page_key: &str,
        result: &ExtractionResult,
    ) -> StorageResult<RecordOutcome> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        let page_id = upsert_page(&tx, page_key, &result.url, &now)?;
        let crawl_id = insert_crawl(&tx, page_id, run_id, result)?;

        let mut changed_data_points = Vec::new();
        for (name, value) in result.data.iter() {
            let current = value.map(|v| v.to_json_string());
            let previous: Option<Option<String>> = tx
                .query_row(
                    "SELECT value FROM data_points WHERE page_id = ?1 AND name = ?2
                     ORDER BY id DESC LIMIT 1",
                    params![page_id, name],
                    |row| row.get(0),
                )
                .optional()?;

            let changed = match &previous {
                // Nothing to diff against: only a present value starts the series
                None => current.is_some(),
                Some(stored) => *stored != current,
            };
            if !changed {
                continue;
            }

            tx.execute(
                "INSERT INTO data_points (page_id, crawl_id, name, value, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![page_id, crawl_id, name, current, now],
            )?;
            changed_data_points.push(name.to_string());
        }

        tx.commit()?;

        tracing::debug!(
            "Recorded crawl {} of {} ({} data points changed)",
            crawl_id,
            result.url,
            changed_data_points.len()
        );

        Ok(RecordOutcome {
            crawl_id,
            changed_data_points,
        })
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{CrawlMetadata, ErrorCategory};
    use crate::extract::{DataPoints, DataValue};
    use crate::quality::validate;

    fn page_result(title: Option<&str>, words: u64) -> ExtractionResult {
        let mut data = DataPoints::new();
        data.insert("page_title", title.map(|t| DataValue::Text(t.to_string())));
        data.insert("word_count", Some(DataValue::Count(words)));

        let mut result = ExtractionResult::failure(
            "https://example.com/a",
            "https://example.com/a",
            ErrorCategory::Unknown,
            "",
            Some(200),
            CrawlMetadata::default(),
        );
        result.success = true;
        result.error_message = None;
        result.error_detail = None;
        result.error_category = None;
        result.validation = Some(validate(&data, "https://example.com/a"));
        result.data = data;
        result
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteSink::new_in_memory().is_ok());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let run_id = sink.begin_run("abc123").unwrap();

        let run = sink.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash, "abc123");
        assert!(run.finished_at.is_none());

        sink.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = sink.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());

        assert!(matches!(
            sink.finish_run(999, RunStatus::Failed),
            Err(StorageError::RunNotFound(999))
        ));
    }

    #[test]
    fn test_first_record_stores_present_values_only() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let outcome = sink.record(None, "page1", &page_result(None, 120)).unwrap();

        assert_eq!(outcome.changed_data_points, vec!["word_count".to_string()]);
        let latest = sink.latest_values("page1").unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["word_count"].as_deref(), Some("120"));
    }

    #[test]
    fn test_unchanged_values_are_not_rewritten() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.record(None, "page1", &page_result(Some("Home"), 120)).unwrap();
        let second = sink.record(None, "page1", &page_result(Some("Home"), 120)).unwrap();
        assert!(second.changed_data_points.is_empty());

        let third = sink.record(None, "page1", &page_result(Some("Home"), 150)).unwrap();
        assert_eq!(third.changed_data_points, vec!["word_count".to_string()]);

        let history = sink.data_point_history("page1", "word_count").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].value.as_deref(), Some("150"));
        assert_eq!(history[1].crawl_id, third.crawl_id);
    }

    #[test]
    fn test_value_becoming_absent_is_recorded() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        sink.record(None, "page1", &page_result(Some("Home"), 120)).unwrap();
        let outcome = sink.record(None, "page1", &page_result(None, 120)).unwrap();

        assert_eq!(outcome.changed_data_points, vec!["page_title".to_string()]);
        let latest = sink.latest_values("page1").unwrap();
        assert_eq!(latest["page_title"], None);
        assert_eq!(latest["word_count"].as_deref(), Some("120"));
    }

    #[test]
    fn test_statistics() {
        let mut sink = SqliteSink::new_in_memory().unwrap();
        let run_id = sink.begin_run("hash").unwrap();
        sink.record(Some(run_id), "page1", &page_result(Some("Home"), 120))
            .unwrap();
        let failed = ExtractionResult::failure(
            "https://example.com/missing",
            "https://example.com/missing",
            ErrorCategory::ClientError,
            "HTTP 404 Not Found",
            Some(404),
            CrawlMetadata::default(),
        );
        sink.record(Some(run_id), "page2", &failed).unwrap();

        let stats = sink.statistics().unwrap();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.crawls, 2);
        assert_eq!(stats.successful_crawls, 1);
        assert_eq!(stats.failed_crawls, 1);
        assert_eq!(stats.failures_by_category.get("client_error"), Some(&1));
        assert!(stats.average_quality.is_some());
    }

    #[test]
    fn test_unknown_page() {
        let sink = SqliteSink::new_in_memory().unwrap();
        assert!(matches!(
            sink.latest_values("nope"),
            Err(StorageError::PageNotFound(_))
        ));
    }
}
