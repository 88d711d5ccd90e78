//! Render engine seam
//!
//! The crawler consumes page rendering as an opaque capability: "render a URL and
//! return the final HTML, status, headers, and optionally a screenshot". Any engine
//! (plain HTTP, headless browser, remote rendering service) plugs in by implementing
//! [`RenderEngine`].
//!
//! One engine instance is shared by every attempt and every page of a crawl run.
//! [`EngineHandle`] creates it lazily on first use, serializes that creation, and
//! drops it on close so the next run starts a fresh one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by a render engine (as opposed to a structured failed render)
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Render engine failed to start: {0}")]
    Init(String),

    #[error("{0}")]
    Engine(String),

    #[error("URL disallowed by robots.txt: {url}")]
    Disallowed { url: String },

    #[error("Render timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

/// How long the engine waits for the page before reading it back
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Wait until the network has been idle, then settle for the extra wait
    NetworkIdle,
}

/// Per-render configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub timeout: Duration,
    pub wait_strategy: WaitStrategy,
    /// Settle time after the wait strategy is satisfied
    pub extra_wait: Duration,
    /// Use a profile that reduces automation fingerprinting
    pub stealth: bool,
    pub capture_screenshot: bool,
    pub respect_robots_txt: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_strategy: WaitStrategy::NetworkIdle,
            extra_wait: Duration::from_secs_f64(1.5),
            stealth: false,
            capture_screenshot: false,
            respect_robots_txt: true,
        }
    }
}

/// What an engine produced for one URL
///
/// A render that reached the server but did not produce a usable page comes back with
/// `success == false`, the status code if any, and an `error_message`.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub success: bool,
    /// URL after redirects
    pub final_url: String,
    pub status_code: Option<u16>,
    pub html: String,
    pub response_headers: HashMap<String, String>,
    pub screenshot: Option<Vec<u8>>,
    pub error_message: Option<String>,
}

impl RenderOutput {
    /// A successful render
    pub fn page(final_url: impl Into<String>, status_code: u16, html: impl Into<String>) -> Self {
        Self {
            success: true,
            final_url: final_url.into(),
            status_code: Some(status_code),
            html: html.into(),
            ..Self::default()
        }
    }

    /// A structured failure
    pub fn failure(
        final_url: impl Into<String>,
        status_code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            final_url: final_url.into(),
            status_code,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Trait for page rendering implementations
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Renders one URL
    ///
    /// Engines may be called concurrently; an engine that cannot render
    /// concurrently must be used with a batch concurrency of 1.
    async fn render(&self, url: &str, config: &RenderConfig) -> Result<RenderOutput, RenderError>;

    /// Releases engine resources
    async fn close(&self) {}
}

/// Creates render engines on demand
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn RenderEngine>, RenderError>;
}

/// Hands out an engine the caller already built
struct ExistingEngine(Arc<dyn RenderEngine>);

#[async_trait]
impl EngineFactory for ExistingEngine {
    async fn create(&self) -> Result<Arc<dyn RenderEngine>, RenderError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Lazily created, explicitly closed render engine
///
/// Closing takes the engine out of the handle; the next [`EngineHandle::get`] creates
/// a new one through the factory.
#[derive(Clone)]
pub struct EngineHandle {
    factory: Arc<dyn EngineFactory>,
    engine: Arc<Mutex<Option<Arc<dyn RenderEngine>>>>,
}

impl EngineHandle {
    /// A handle that builds its engine through `factory` on first use
    pub fn lazy(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: Arc::new(Mutex::new(None)),
        }
    }

    /// A handle around an engine that already exists
    ///
    /// The same engine is handed out again after a close, so it must tolerate
    /// being closed at the end of every batch.
    pub fn from_engine(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            factory: Arc::new(ExistingEngine(Arc::clone(&engine))),
            engine: Arc::new(Mutex::new(Some(engine))),
        }
    }

    /// Returns the engine, creating it if none is running
    ///
    /// Concurrent first calls wait for a single creation.
    pub async fn get(&self) -> Result<Arc<dyn RenderEngine>, RenderError> {
        let mut slot = self.engine.lock().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        tracing::debug!("Starting render engine");
        let engine = self.factory.create().await?;
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// Returns true while an engine is running
    pub fn is_started(&self) -> bool {
        // Locked means a creation or lookup is in progress
        self.engine.try_lock().map_or(true, |slot| slot.is_some())
    }

    /// Closes the running engine, if any
    pub async fn close(&self) {
        let engine = self.engine.lock().await.take();
        if let Some(engine) = engine {
            tracing::debug!("Closing render engine");
            engine.close().await;
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("started", &self.is_started())
            .finish()
    }
}
