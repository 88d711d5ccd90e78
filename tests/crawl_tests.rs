//! Integration tests for the crawler
//!
//! The retry state machine and the batch concurrency bound are exercised against
//! stub render engines on a paused clock. The full cycle (HTTP engine, extraction,
//! persistence) runs against a wiremock server.

use async_trait::async_trait;
use sitelens::config::{RateLimitConfig, UserAgentConfig};
use sitelens::crawler::{
    CrawlOptions, Crawler, EngineHandle, ErrorCategory, HttpRenderEngine, RateLimiter,
    RenderConfig, RenderEngine, RenderError, RenderOutput,
};
use sitelens::extract::{DataValue, ExtractError, ExtractionPipeline, Extractor, Page};
use sitelens::storage::{page_key, ResultSink, RunStatus, SqliteSink};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html lang="en"><head>
    <title>Blue Widgets | Example Shop</title>
    <meta name="description" content="Hand-made blue widgets shipped worldwide.">
    <link rel="canonical" href="https://example.com/widgets">
  </head><body>
    <h1>Blue Widgets</h1>
    <p>Our blue widgets are made by hand from recycled materials and shipped to every country.</p>
    <a href="/about">About us</a>
  </body></html>"#;

/// Replies per URL from a script and records every render config it receives
#[derive(Default)]
struct ScriptedEngine {
    scripts: Mutex<HashMap<String, Vec<RenderOutput>>>,
    calls: Mutex<Vec<(String, RenderConfig)>>,
}

impl ScriptedEngine {
    fn with_script(url: &str, mut outputs: Vec<RenderOutput>) -> Arc<Self> {
        outputs.reverse();
        let engine = Self::default();
        engine.scripts.lock().unwrap().insert(url.to_string(), outputs);
        Arc::new(engine)
    }

    fn calls(&self) -> Vec<RenderConfig> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    async fn render(&self, url: &str, config: &RenderConfig) -> Result<RenderOutput, RenderError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), config.clone()));
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|script| script.pop());
        Ok(next.unwrap_or_else(|| RenderOutput::page(url, 200, PAGE)))
    }
}

fn server_error(url: &str) -> RenderOutput {
    RenderOutput::failure(url, Some(500), "HTTP 500 Internal Server Error")
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_server_errors() {
    let url = "https://example.com/widgets";
    let engine = ScriptedEngine::with_script(
        url,
        vec![
            server_error(url),
            server_error(url),
            RenderOutput::page(url, 200, PAGE),
        ],
    );
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));

    let result = crawler
        .crawl_one(url, &CrawlOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.crawl_metadata.retry_attempt, 2);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(engine.calls().len(), 3);

    let report = result.validation.unwrap();
    assert!(report.issues.is_empty());
    assert_eq!(
        result.data.text("page_title"),
        Some("Blue Widgets | Example Shop")
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_report_failure() {
    let url = "https://example.com/down";
    let engine = ScriptedEngine::with_script(
        url,
        vec![server_error(url), server_error(url), server_error(url)],
    );
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));

    let result = crawler
        .crawl_one(url, &CrawlOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::ServerError));
    assert_eq!(result.retry_count(), 2);
    assert!(result.validation.is_none());
    assert!(result.error_message.is_some());
    assert_eq!(engine.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_terminal() {
    let url = "https://example.com/missing";
    let engine = ScriptedEngine::with_script(
        url,
        vec![RenderOutput::failure(url, Some(404), "HTTP 404 Not Found")],
    );
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));
    let options = CrawlOptions {
        max_retries: 5,
        ..CrawlOptions::default()
    };

    let result = crawler
        .crawl_one(url, &options, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status_code, Some(404));
    assert_eq!(result.error_category, Some(ErrorCategory::ClientError));
    assert_eq!(result.retry_count(), 0);
    assert_eq!(engine.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bot_detection_switches_to_stealth() {
    let url = "https://example.com/guarded";
    let engine = ScriptedEngine::with_script(
        url,
        vec![RenderOutput::failure(
            url,
            Some(403),
            "Access denied: bot protection challenge",
        )],
    );
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));

    let result = crawler
        .crawl_one(url, &CrawlOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].stealth);
    assert!(calls[1].stealth);
    assert!(result.crawl_metadata.stealth);
}

/// Counts renders in flight and remembers the peak
#[derive(Default)]
struct CountingEngine {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    renders: AtomicUsize,
}

#[async_trait]
impl RenderEngine for CountingEngine {
    async fn render(&self, url: &str, _config: &RenderConfig) -> Result<RenderOutput, RenderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.renders.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(2)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RenderOutput::page(url, 200, PAGE))
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_respects_concurrency_limit() {
    let engine = Arc::new(CountingEngine::default());
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));
    let urls: Vec<String> = (0..10)
        .map(|i| format!("https://example.com/page-{}", i))
        .collect();

    let results = crawler
        .crawl_batch(
            &urls,
            3,
            &CrawlOptions::default(),
            Arc::new(RateLimiter::default()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|r| r.success));
    for (result, url) in results.iter().zip(&urls) {
        assert_eq!(&result.requested_url, url);
    }
    assert_eq!(engine.renders.load(Ordering::SeqCst), 10);
    let peak = engine.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {}", peak);
    assert!(peak >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_page_paces_the_batch() {
    let first = "https://example.com/first";
    let engine = ScriptedEngine::with_script(
        first,
        vec![RenderOutput::failure(first, Some(429), "HTTP 429 Too Many Requests")],
    );
    let crawler = Crawler::new(EngineHandle::from_engine(engine));
    let limiter = Arc::new(RateLimiter::default());

    let results = crawler
        .crawl_batch(
            &[first],
            1,
            &CrawlOptions::default(),
            Arc::clone(&limiter),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!results[0].success);
    assert_eq!(limiter.consecutive_throttles(), 1);
}

/// Records when each URL was rendered; URLs containing "throttled" get a 429
#[derive(Default)]
struct TimedEngine {
    renders: Mutex<Vec<(String, tokio::time::Instant)>>,
}

impl TimedEngine {
    fn started_at(&self, suffix: &str) -> tokio::time::Instant {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .find(|(url, _)| url.ends_with(suffix))
            .map(|(_, at)| *at)
            .unwrap()
    }
}

#[async_trait]
impl RenderEngine for TimedEngine {
    async fn render(&self, url: &str, _config: &RenderConfig) -> Result<RenderOutput, RenderError> {
        self.renders
            .lock()
            .unwrap()
            .push((url.to_string(), tokio::time::Instant::now()));
        if url.contains("throttled") {
            return Ok(RenderOutput::failure(url, Some(429), "HTTP 429 Too Many Requests"));
        }
        Ok(RenderOutput::page(url, 200, PAGE))
    }
}

#[tokio::test(start_paused = true)]
async fn test_throttle_delays_admission_of_next_page() {
    let engine = Arc::new(TimedEngine::default());
    let crawler = Crawler::new(EngineHandle::from_engine(engine.clone()));
    let limiter = Arc::new(RateLimiter::default());
    let urls = [
        "https://example.com/throttled",
        "https://example.com/next",
        "https://example.com/after",
    ];

    let results = crawler
        .crawl_batch(
            &urls,
            1,
            &CrawlOptions::default(),
            Arc::clone(&limiter),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results[0].status_code, Some(429));
    assert_eq!(results[0].retry_count(), 0);
    assert!(results[1].success && results[2].success);
    assert_eq!(engine.renders.lock().unwrap().len(), 3);

    // 2 x 2^1 after the first throttle
    let throttled = engine.started_at("/throttled");
    let next = engine.started_at("/next");
    assert!(next - throttled >= Duration::from_secs(4));

    // A success resets the counter and pacing falls back to the 1-3s jitter
    let after = engine.started_at("/after");
    let gap = after - next;
    assert!(gap >= Duration::from_secs(1), "gap was {:?}", gap);
    assert!(gap <= Duration::from_secs(3), "gap was {:?}", gap);
    assert_eq!(limiter.consecutive_throttles(), 0);
}

struct PanickingExtractor;

impl Extractor for PanickingExtractor {
    fn name(&self) -> &str {
        "explodes"
    }

    fn extract(&self, _page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        panic!("extractor bug");
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_extractor_does_not_fail_the_page() {
    let url = "https://example.com/widgets";
    let engine = ScriptedEngine::with_script(url, Vec::new());
    let mut pipeline = ExtractionPipeline::new();
    pipeline.register(PanickingExtractor);
    let expected_entries = pipeline.len();

    let crawler = Crawler::new(EngineHandle::from_engine(engine)).with_pipeline(pipeline);
    let result = crawler
        .crawl_one(url, &CrawlOptions::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data.len(), expected_entries);
    assert!(result.data.contains("explodes"));
    assert!(result.data.get("explodes").is_none());

    let summary = result.extraction.unwrap();
    assert_eq!(summary.total, expected_entries);
    assert!(summary.errors.iter().any(|e| e.name == "explodes"));
}

#[tokio::test]
async fn test_full_cycle_against_mock_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(PAGE),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    let engine = HttpRenderEngine::new(&user_agent, 5).unwrap();
    let crawler = Crawler::new(EngineHandle::from_engine(Arc::new(engine)));
    let options = CrawlOptions {
        respect_robots_txt: false,
        ..CrawlOptions::default()
    };
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        min_delay_ms: 0,
        max_delay_ms: 0,
        ..RateLimitConfig::default()
    }));

    let dir = tempfile::TempDir::new().unwrap();
    let mut sink = SqliteSink::new(&dir.path().join("crawl.db")).unwrap();
    let run_id = sink.begin_run("test-hash").unwrap();

    let urls = vec![
        format!("{}/widgets", server.uri()),
        format!("{}/gone", server.uri()),
    ];
    let mut recorded = Vec::new();
    let results = crawler
        .crawl_batch_with(
            &urls,
            2,
            &options,
            limiter,
            &CancellationToken::new(),
            |_, result| {
                let key = page_key(&result.requested_url);
                let outcome = sink.record(Some(run_id), &key, result).unwrap();
                recorded.push((key, outcome));
            },
        )
        .await
        .unwrap();
    sink.finish_run(run_id, RunStatus::Completed).unwrap();

    assert!(results[0].success);
    assert_eq!(results[0].data.text("h1"), Some("Blue Widgets"));
    assert!(results[0].quality_score().is_some());
    assert!(!results[1].success);
    assert_eq!(results[1].status_code, Some(404));

    assert_eq!(recorded.len(), 2);
    let stats = sink.statistics().unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.crawls, 2);
    assert_eq!(stats.successful_crawls, 1);
    assert_eq!(stats.failures_by_category.get("client_error"), Some(&1));

    let widgets_key = page_key(&results[0].requested_url);
    let latest = sink.latest_values(&widgets_key).unwrap();
    assert_eq!(latest.get("h1").cloned().flatten().as_deref(), Some("\"Blue Widgets\""));
    assert_eq!(sink.get_run(run_id).unwrap().status, RunStatus::Completed);
}
