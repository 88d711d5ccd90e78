//! Batch crawling
//!
//! Every URL of a batch runs as its own task, gated by a semaphore of size
//! `concurrency`. A task paces through the shared [`RateLimiter`] with its page's
//! last status code *before* releasing its slot, so a throttling response slows
//! whichever page is admitted next.

use crate::crawler::classifier::ErrorCategory;
use crate::crawler::coordinator::{CrawlOptions, Crawler};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::result::{CrawlMetadata, ExtractionResult};
use crate::sitemap::SitemapResolver;
use crate::CrawlError;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type TaskOutput = (usize, Result<ExtractionResult, CrawlError>);

impl Crawler {
    /// Crawls a list of URLs, returning results in input order
    ///
    /// See [`Crawler::crawl_batch_with`].
    pub async fn crawl_batch<S: AsRef<str>>(
        &self,
        urls: &[S],
        concurrency: usize,
        options: &CrawlOptions,
        limiter: Arc<RateLimiter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractionResult>, CrawlError> {
        self.crawl_batch_with(urls, concurrency, options, limiter, cancel, |_, _| {})
            .await
    }

    /// Crawls a list of URLs, calling `on_result` as each page finishes
    ///
    /// A page that fails, including one whose URL is not crawlable or whose crawl
    /// panics, becomes a failed result and never affects its siblings. Cancellation
    /// aborts every outstanding task and returns [`CrawlError::Cancelled`]; a task the
    /// runtime itself lost stops the batch with [`CrawlError::TaskFailed`]. The render
    /// engine is closed when the batch ends either way.
    ///
    /// # Arguments
    ///
    /// * `urls` - Pages to crawl
    /// * `concurrency` - Pages in flight at once; must respect the render engine's own limits
    /// * `options` - Applied to every page
    /// * `limiter` - Pacing state shared by every page of this run
    /// * `cancel` - Stops the whole batch
    /// * `on_result` - Called with the input index and result of each finished page
    pub async fn crawl_batch_with<S, F>(
        &self,
        urls: &[S],
        concurrency: usize,
        options: &CrawlOptions,
        limiter: Arc<RateLimiter>,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> Result<Vec<ExtractionResult>, CrawlError>
    where
        S: AsRef<str>,
        F: FnMut(usize, &ExtractionResult),
    {
        let total = urls.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let options = Arc::new(options.clone());
        tracing::info!(
            "Crawling {} URLs with concurrency {}",
            total,
            concurrency.max(1)
        );

        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let crawler = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let limiter = Arc::clone(&limiter);
            let options = Arc::clone(&options);
            let cancel = cancel.clone();
            let url = url.as_ref().to_string();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err(CrawlError::Cancelled));
                };
                let outcome = crawl_isolated(&crawler, &url, &options, &cancel).await;
                let status = match &outcome {
                    Ok(result) => result.status_code,
                    Err(_) => return (index, outcome),
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => (index, Err(CrawlError::Cancelled)),
                    _ = limiter.wait(status) => (index, outcome),
                }
            });
        }

        let mut slots: Vec<Option<ExtractionResult>> = (0..total).map(|_| None).collect();
        let mut finished = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CrawlError::Cancelled),
                joined = tasks.join_next() => Ok(joined),
            };

            let outcome = match next {
                Ok(None) => break,
                Ok(Some(Ok((index, outcome)))) => outcome.map(|result| (index, result)),
                // Panics are caught inside the task, so this is an abort or runtime shutdown
                Ok(Some(Err(e))) => Err(CrawlError::TaskFailed(e.to_string())),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((index, result)) => {
                    finished += 1;
                    tracing::info!(
                        "[{}/{}] {} {}",
                        finished,
                        total,
                        if result.success { "ok" } else { "failed" },
                        result.requested_url
                    );
                    on_result(index, &result);
                    slots[index] = Some(result);
                }
                Err(e) => {
                    tracing::warn!("Batch stopped: {}", e);
                    tasks.abort_all();
                    self.close().await;
                    return Err(e);
                }
            }
        }

        self.close().await;

        Ok(slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    ExtractionResult::failure(
                        url.as_ref(),
                        url.as_ref(),
                        ErrorCategory::Unknown,
                        "Crawl task did not complete",
                        None,
                        CrawlMetadata::default(),
                    )
                })
            })
            .collect())
    }

    /// Resolves sitemaps and crawls every page they list
    pub async fn crawl_urls_from_sitemaps<S: AsRef<str>>(
        &self,
        resolver: &SitemapResolver,
        sitemaps: &[S],
        concurrency: usize,
        options: &CrawlOptions,
        limiter: Arc<RateLimiter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractionResult>, CrawlError> {
        let urls = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            urls = resolver.resolve_many(sitemaps) => urls?,
        };
        tracing::info!("Sitemaps listed {} pages", urls.len());
        self.crawl_batch(&urls, concurrency, options, limiter, cancel)
            .await
    }
}

/// Crawls one page, folding bad input and panics into failed results
async fn crawl_isolated(
    crawler: &Crawler,
    url: &str,
    options: &CrawlOptions,
    cancel: &CancellationToken,
) -> Result<ExtractionResult, CrawlError> {
    match AssertUnwindSafe(crawler.crawl_one(url, options, cancel))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(CrawlError::InvalidUrl(e))) => {
            tracing::warn!("Skipping {}: {}", url, e);
            Ok(ExtractionResult::rejected(url, &e.to_string()))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::error!("Crawl of {} panicked", url);
            Ok(ExtractionResult::failure(
                url,
                url,
                ErrorCategory::Unknown,
                "Crawl panicked",
                None,
                CrawlMetadata::default(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::crawler::engine::{
        EngineFactory, EngineHandle, RenderConfig, RenderEngine, RenderError, RenderOutput,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowEngine {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait]
    impl RenderEngine for SlowEngine {
        async fn render(
            &self,
            url: &str,
            _config: &RenderConfig,
        ) -> Result<RenderOutput, RenderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("missing") {
                return Ok(RenderOutput::failure(url, Some(404), "HTTP 404"));
            }
            Ok(RenderOutput::page(url, 200, "<html><title>T</title></html>"))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn quick_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(RateLimitConfig {
            min_delay_ms: 10,
            max_delay_ms: 20,
            ..RateLimitConfig::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let engine = Arc::new(SlowEngine::default());
        let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));
        let urls = vec![
            "https://example.com/a",
            "not a url at all",
            "https://example.com/missing",
            "https://example.com/b",
        ];

        let mut seen = Vec::new();
        let results = crawler
            .crawl_batch_with(
                &urls,
                2,
                &CrawlOptions::default(),
                quick_limiter(),
                &CancellationToken::new(),
                |index, _| seen.push(index),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error_category, Some(ErrorCategory::ClientError));
        assert_eq!(results[2].status_code, Some(404));
        assert!(results[3].requested_url.ends_with("/b"));

        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(engine.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_batch() {
        let engine = Arc::new(SlowEngine::default());
        let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));
        let urls: Vec<String> = (0..10).map(|i| format!("https://example.com/{}", i)).collect();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = crawler
            .crawl_batch(&urls, 3, &CrawlOptions::default(), quick_limiter(), &cancel)
            .await;
        assert!(matches!(outcome, Err(CrawlError::Cancelled)));
        assert!(engine.closed.load(Ordering::SeqCst));
    }

    struct PanickingEngine;

    #[async_trait]
    impl RenderEngine for PanickingEngine {
        async fn render(
            &self,
            url: &str,
            _config: &RenderConfig,
        ) -> Result<RenderOutput, RenderError> {
            if url.contains("boom") {
                panic!("renderer crashed");
            }
            Ok(RenderOutput::page(url, 200, "<html><title>T</title></html>"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_crawl_becomes_failed_result() {
        let crawler = Crawler::new(EngineHandle::from_engine(Arc::new(PanickingEngine)));
        let urls = vec![
            "https://example.com/a",
            "https://example.com/boom",
            "https://example.com/b",
        ];

        let mut reported = Vec::new();
        let results = crawler
            .crawl_batch_with(
                &urls,
                2,
                &CrawlOptions::default(),
                quick_limiter(),
                &CancellationToken::new(),
                |index, result| reported.push((index, result.success)),
            )
            .await
            .unwrap();

        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error_category, Some(ErrorCategory::Unknown));
        assert!(results[2].success);

        reported.sort_unstable();
        assert_eq!(reported, vec![(0, true), (1, false), (2, true)]);
    }

    /// Fails every render once closed
    #[derive(Default)]
    struct ClosableEngine {
        closed: AtomicBool,
    }

    #[async_trait]
    impl RenderEngine for ClosableEngine {
        async fn render(
            &self,
            url: &str,
            _config: &RenderConfig,
        ) -> Result<RenderOutput, RenderError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(RenderError::Engine("engine already closed".to_string()));
            }
            Ok(RenderOutput::page(url, 200, "<html><title>T</title></html>"))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ClosableFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl EngineFactory for ClosableFactory {
        async fn create(&self) -> Result<Arc<dyn RenderEngine>, RenderError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ClosableEngine::default()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_batch_gets_a_fresh_engine() {
        let factory = Arc::new(ClosableFactory::default());
        let crawler = Crawler::new(EngineHandle::lazy(factory.clone()));
        let options = CrawlOptions::default();
        let cancel = CancellationToken::new();

        let first = crawler
            .crawl_batch(&["https://example.com/one"], 1, &options, quick_limiter(), &cancel)
            .await
            .unwrap();
        let second = crawler
            .crawl_batch(&["https://example.com/two"], 1, &options, quick_limiter(), &cancel)
            .await
            .unwrap();

        assert!(first[0].success);
        assert!(second[0].success, "{:?}", second[0].error_detail);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = Arc::new(SlowEngine::default());
        let crawler = Crawler::new(EngineHandle::from_engine(engine));
        let urls: Vec<String> = Vec::new();
        let results = crawler
            .crawl_batch(&urls, 3, &CrawlOptions::default(), quick_limiter(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
