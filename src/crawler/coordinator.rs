//! Single-page crawl orchestration
//!
//! [`Crawler::crawl_one`] drives one URL through render, extraction, and validation,
//! retrying classified failures:
//!
//! ```text
//! Attempting(n) --success--------------------------------> Done(success)
//! Attempting(n) --failure, terminal or n == max-1--------> Done(failure)
//! Attempting(n) --failure, retryable--> sleep(backoff) --> Attempting(n+1)
//! ```
//!
//! Retry state lives on the stack of one call. The only state shared between pages
//! is the render engine handle and, in a batch, the rate limiter.

use crate::config::Config;
use crate::crawler::classifier::{classify, retry_delay, Classification, ErrorCategory};
use crate::crawler::engine::{EngineHandle, RenderConfig, RenderError, RenderOutput, WaitStrategy};
use crate::crawler::fetcher::HttpEngineFactory;
use crate::crawler::result::{CrawlMetadata, ExtractionResult};
use crate::crawler::timeout::{timeout_for, wait_time_for, MAX_TIMEOUT};
use crate::extract::ExtractionPipeline;
use crate::quality::{dom_rendered_completely, validate};
use crate::storage::{page_key, BlobStore, LocalBlobStore, ScreenshotKind};
use crate::url::UrlNormalizer;
use crate::CrawlError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-crawl knobs
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOptions {
    /// Total attempts per page, including the first
    pub max_retries: u32,
    /// Timeout for pages that match no slow or medium bucket
    pub base_timeout: Duration,
    pub capture_screenshot: bool,
    pub respect_robots_txt: bool,
    /// Render in stealth mode from the first attempt
    pub force_stealth: bool,
    /// Run only these extractors, in this order
    pub data_points: Option<Vec<String>>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_timeout: Duration::from_secs(30),
            capture_screenshot: false,
            respect_robots_txt: true,
            force_stealth: false,
            data_points: None,
        }
    }
}

impl CrawlOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.crawler.max_retries,
            base_timeout: Duration::from_secs(config.crawler.base_timeout_secs),
            capture_screenshot: config.crawler.capture_screenshots,
            respect_robots_txt: config.crawler.respect_robots_txt,
            ..Self::default()
        }
    }
}

/// Decisions carried from one attempt to the next
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    previous: Option<ErrorCategory>,
}

impl RetryState {
    fn stealth(&self, options: &CrawlOptions) -> bool {
        options.force_stealth || self.previous.is_some_and(|c| c.should_use_stealth())
    }

    fn timeout(&self, url: &str, options: &CrawlOptions) -> Duration {
        let timeout = timeout_for(url, options.base_timeout, self.attempt);
        if self.previous.is_some_and(|c| c.should_increase_timeout()) {
            timeout.mul_f64(1.5).min(MAX_TIMEOUT)
        } else {
            timeout
        }
    }

    fn render_config(&self, url: &str, options: &CrawlOptions) -> RenderConfig {
        RenderConfig {
            timeout: self.timeout(url, options),
            wait_strategy: WaitStrategy::NetworkIdle,
            extra_wait: wait_time_for(url),
            stealth: self.stealth(options),
            capture_screenshot: options.capture_screenshot,
            respect_robots_txt: options.respect_robots_txt,
        }
    }

    fn advance(&mut self, category: ErrorCategory) {
        self.attempt += 1;
        self.previous = Some(category);
    }
}

/// One failed attempt, classified
struct AttemptFailure {
    final_url: String,
    status_code: Option<u16>,
    message: String,
    classification: Classification,
}

impl AttemptFailure {
    fn from_output(output: RenderOutput) -> Self {
        let message = output
            .error_message
            .unwrap_or_else(|| "Render reported failure without a message".to_string());
        Self {
            classification: classify(&message, output.status_code),
            final_url: output.final_url,
            status_code: output.status_code,
            message,
        }
    }

    fn from_error(url: &Url, error: RenderError) -> Self {
        let category = match error {
            RenderError::Disallowed { .. } => ErrorCategory::ClientError,
            RenderError::Timeout(_) => ErrorCategory::Timeout,
            RenderError::Init(_) | RenderError::Engine(_) => ErrorCategory::Unknown,
        };
        Self {
            final_url: url.to_string(),
            status_code: None,
            message: error.to_string(),
            classification: Classification {
                category,
                should_retry: category.is_retryable(),
            },
        }
    }
}

/// Crawls pages through a shared render engine
///
/// Cheap to clone; clones share the engine, the extraction pipeline, and the blob store.
#[derive(Clone)]
pub struct Crawler {
    engine: EngineHandle,
    pipeline: Arc<ExtractionPipeline>,
    normalizer: Arc<UrlNormalizer>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl Crawler {
    /// Creates a crawler with the default extractor catalogue and URL rules
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            pipeline: Arc::new(ExtractionPipeline::new()),
            normalizer: Arc::new(UrlNormalizer::default()),
            blobs: None,
        }
    }

    /// Creates a crawler that renders over HTTP and stores screenshots on disk
    pub fn from_config(config: &Config) -> Self {
        let factory = HttpEngineFactory::new(config.user_agent.clone());
        Self::new(EngineHandle::lazy(Arc::new(factory)))
            .with_normalizer(UrlNormalizer::new(config.urls.clone()))
            .with_blob_store(Arc::new(LocalBlobStore::new(&config.output.screenshot_dir)))
    }

    pub fn with_pipeline(mut self, pipeline: ExtractionPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    pub fn with_normalizer(mut self, normalizer: UrlNormalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn pipeline(&self) -> &ExtractionPipeline {
        &self.pipeline
    }

    pub fn normalizer(&self) -> &UrlNormalizer {
        &self.normalizer
    }

    /// Releases the render engine
    pub async fn close(&self) {
        self.engine.close().await;
    }

    /// Crawls one URL
    ///
    /// Every crawl failure is reported as a failed [`ExtractionResult`]. The only
    /// errors are an input that does not normalize to a crawlable URL and
    /// cancellation, which abandons any remaining attempts immediately.
    pub async fn crawl_one(
        &self,
        url: &str,
        options: &CrawlOptions,
        cancel: &CancellationToken,
    ) -> crate::Result<ExtractionResult> {
        let normalized = self.normalizer.normalize(url)?;
        let target = normalized.as_str();
        let max_retries = options.max_retries.max(1);
        let started = Instant::now();
        let mut state = RetryState::default();

        loop {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let config = state.render_config(target, options);
            let metadata = CrawlMetadata {
                timeout_secs: config.timeout.as_secs_f64(),
                stealth: config.stealth,
                retry_attempt: state.attempt,
                wait_strategy: config.wait_strategy,
                extra_wait_secs: config.extra_wait.as_secs_f64(),
            };
            tracing::debug!(
                "Attempt {}/{} for {} (timeout {:?}, stealth {})",
                state.attempt + 1,
                max_retries,
                target,
                config.timeout,
                config.stealth
            );

            let rendered = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                rendered = self.render(target, &config) => rendered,
            };

            let failure = match rendered {
                Ok(output) if output.success => {
                    let mut result = self.build_success(&normalized, &output, options, metadata);
                    if let Some(bytes) = output.screenshot.as_deref() {
                        result.screenshot = self.store_screenshot(target, bytes).await;
                    }
                    result.elapsed_ms = started.elapsed().as_millis() as u64;
                    return Ok(result);
                }
                Ok(output) => AttemptFailure::from_output(output),
                Err(e) => AttemptFailure::from_error(&normalized, e),
            };

            let category = failure.classification.category;
            let exhausted = state.attempt + 1 >= max_retries;
            if !failure.classification.should_retry || exhausted {
                tracing::error!(
                    "Giving up on {} after {} attempt(s): {} ({})",
                    target,
                    state.attempt + 1,
                    failure.message,
                    category
                );
                let mut result = ExtractionResult::failure(
                    target,
                    &failure.final_url,
                    category,
                    &failure.message,
                    failure.status_code,
                    metadata,
                );
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                return Ok(result);
            }

            let delay = retry_delay(state.attempt, category);
            tracing::warn!(
                "Attempt {} for {} failed ({}): {}; retrying in {:?}",
                state.attempt + 1,
                target,
                category,
                failure.message,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            state.advance(category);
        }
    }

    /// Renders through the shared engine, bounded by the attempt's timeout plus settle time
    async fn render(&self, url: &str, config: &RenderConfig) -> Result<RenderOutput, RenderError> {
        let engine = self.engine.get().await?;
        let budget = config.timeout + config.extra_wait;
        tokio::time::timeout(budget, engine.render(url, config))
            .await
            .map_err(|_| RenderError::Timeout(budget))?
    }

    fn build_success(
        &self,
        requested: &Url,
        output: &RenderOutput,
        options: &CrawlOptions,
        metadata: CrawlMetadata,
    ) -> ExtractionResult {
        let base = Url::parse(&output.final_url).unwrap_or_else(|_| requested.clone());
        let extraction = match &options.data_points {
            Some(names) => self.pipeline.extract_selected(&output.html, &base, names),
            None => self.pipeline.extract_all(&output.html, &base),
        };
        let validation = validate(&extraction.data, requested.as_str());

        tracing::debug!(
            "Extracted {}/{} data points from {} (quality {})",
            extraction.summary.successful,
            extraction.summary.total,
            base,
            validation.quality_score
        );

        ExtractionResult {
            url: output.final_url.clone(),
            requested_url: requested.to_string(),
            success: true,
            status_code: output.status_code,
            error_message: None,
            error_detail: None,
            error_category: None,
            data: extraction.data,
            response_headers: output
                .response_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            dom_rendered_completely: dom_rendered_completely(&output.html),
            validation: Some(validation),
            crawl_metadata: metadata,
            extraction: Some(extraction.summary),
            screenshot: None,
            crawled_at: chrono::Utc::now(),
            elapsed_ms: 0,
        }
    }

    async fn store_screenshot(&self, url: &str, bytes: &[u8]) -> Option<String> {
        let blobs = self.blobs.as_ref()?;
        let reference = blobs
            .save(bytes, &page_key(url), ScreenshotKind::Desktop)
            .await;
        if reference.is_none() {
            tracing::warn!("Screenshot for {} is unavailable", url);
        }
        reference
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("engine", &self.engine)
            .field("pipeline", &self.pipeline)
            .field("blob_store", &self.blobs.is_some())
            .finish()
    }
}
