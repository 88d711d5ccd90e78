//! Sitelens: a resilient SEO crawl-and-extract engine
//!
//! This crate crawls the pages of a single site (usually discovered through its
//! XML sitemap), extracts a fixed catalogue of SEO data points from each page, and
//! scores the result. Transient failures are retried with category-weighted
//! backoff, and outbound requests are paced by an adaptive rate limiter.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod quality;
pub mod robots;
pub mod sitemap;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sitelens operations
///
/// Page-level failures never surface here; they are folded into a failed
/// [`ExtractionResult`]. These are the conditions that stop a crawl call itself.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("Sitemap error: {0}")]
    Sitemap(#[from] sitemap::SitemapError),

    #[error("Crawl task failed: {0}")]
    TaskFailed(String),

    #[error("Crawl cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL is empty")]
    Empty,

    #[error("URL is {length} characters long, limit is {max}")]
    TooLong { length: usize, max: usize },

    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("URL points to a non-page file type: .{0}")]
    BlockedExtension(String),
}

/// Result type alias for Sitelens operations
pub type Result<T> = std::result::Result<T, CrawlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOptions, Crawler, ExtractionResult, RateLimiter};
pub use extract::ExtractionPipeline;
pub use quality::ValidationReport;
pub use sitemap::SitemapResolver;
pub use crate::url::{normalize_url, UrlNormalizer};
