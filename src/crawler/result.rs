//! Crawl outcome for one URL

use crate::crawler::classifier::{human_message, ErrorCategory};
use crate::crawler::engine::WaitStrategy;
use crate::extract::{DataPoints, ExtractionSummary};
use crate::quality::ValidationReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// How the returned attempt was configured
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlMetadata {
    pub timeout_secs: f64,
    pub stealth: bool,
    /// Zero-based index of the attempt that produced the result
    pub retry_attempt: u32,
    pub wait_strategy: WaitStrategy,
    pub extra_wait_secs: f64,
}

impl Default for CrawlMetadata {
    fn default() -> Self {
        Self {
            timeout_secs: 0.0,
            stealth: false,
            retry_attempt: 0,
            wait_strategy: WaitStrategy::NetworkIdle,
            extra_wait_secs: 0.0,
        }
    }
}

/// Outcome of crawling one URL
///
/// Built once by the orchestrator from the last attempt and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Final URL after redirects
    pub url: String,
    pub requested_url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    /// User-facing explanation of a failure
    pub error_message: Option<String>,
    /// Underlying error text of a failure
    pub error_detail: Option<String>,
    pub error_category: Option<ErrorCategory>,
    /// One entry per extractor that ran
    pub data: DataPoints,
    pub response_headers: BTreeMap<String, String>,
    pub dom_rendered_completely: bool,
    /// Present on every successful result
    pub validation: Option<ValidationReport>,
    pub crawl_metadata: CrawlMetadata,
    pub extraction: Option<ExtractionSummary>,
    /// Reference to the stored screenshot, if one was captured and saved
    pub screenshot: Option<String>,
    pub crawled_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExtractionResult {
    /// A failed result for a URL that was attempted
    pub fn failure(
        requested_url: &str,
        final_url: &str,
        category: ErrorCategory,
        detail: &str,
        status_code: Option<u16>,
        crawl_metadata: CrawlMetadata,
    ) -> Self {
        Self {
            url: final_url.to_string(),
            requested_url: requested_url.to_string(),
            success: false,
            status_code,
            error_message: Some(human_message(category, detail)),
            error_detail: Some(detail.to_string()),
            error_category: Some(category),
            data: DataPoints::new(),
            response_headers: BTreeMap::new(),
            dom_rendered_completely: false,
            validation: None,
            crawl_metadata,
            extraction: None,
            screenshot: None,
            crawled_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    /// A failed result for input that never reached the render engine
    pub fn rejected(requested_url: &str, detail: &str) -> Self {
        Self::failure(
            requested_url,
            requested_url,
            ErrorCategory::ClientError,
            detail,
            None,
            CrawlMetadata::default(),
        )
    }

    pub fn quality_score(&self) -> Option<u8> {
        self.validation.as_ref().map(|report| report.quality_score)
    }

    /// Number of retries performed before this result
    pub fn retry_count(&self) -> u32 {
        self.crawl_metadata.retry_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_human_message() {
        let result = ExtractionResult::failure(
            "https://example.com/a",
            "https://example.com/a",
            ErrorCategory::ServerError,
            "HTTP 502 Bad Gateway",
            Some(502),
            CrawlMetadata {
                retry_attempt: 2,
                ..CrawlMetadata::default()
            },
        );

        assert!(!result.success);
        assert_eq!(result.error_detail.as_deref(), Some("HTTP 502 Bad Gateway"));
        assert!(result.error_message.as_ref().unwrap().contains("server error"));
        assert_eq!(result.retry_count(), 2);
        assert!(result.quality_score().is_none());
    }

    #[test]
    fn test_serializes_category_snake_case() {
        let result = ExtractionResult::rejected("ftp://example.com", "Invalid URL scheme: ftp");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error_category"], "client_error");
        assert_eq!(json["success"], false);
        assert_eq!(json["crawl_metadata"]["wait_strategy"], "network_idle");
    }
}
