//! Crawler module for rendering and processing pages
//!
//! This module contains the core crawling logic, including:
//! - Failure classification and retry backoff
//! - Adaptive timeouts and rate limiting
//! - The render engine seam and its HTTP implementation
//! - Single-page orchestration and batch crawling

mod classifier;
mod coordinator;
mod engine;
mod fetcher;
mod rate_limiter;
mod result;
mod scheduler;
mod timeout;

pub use classifier::{classify, human_message, retry_delay, Classification, ErrorCategory};
pub use coordinator::{CrawlOptions, Crawler};
pub use engine::{
    EngineFactory, EngineHandle, RenderConfig, RenderEngine, RenderError, RenderOutput,
    WaitStrategy,
};
pub use fetcher::{
    build_http_client, HttpEngineFactory, HttpRenderEngine, DEFAULT_MAX_REDIRECTS,
    STEALTH_USER_AGENT,
};
pub use rate_limiter::RateLimiter;
pub use result::{CrawlMetadata, ExtractionResult};
pub use timeout::{timeout_for, wait_time_for, SiteProfile, MAX_TIMEOUT};
