//! HTTP render engine
//!
//! The default [`RenderEngine`]: a plain `reqwest` GET with bounded redirect
//! following, the per-attempt timeout, and robots.txt checks. It does not execute
//! scripts, so the settle wait is a no-op and no screenshot is ever produced.
//!
//! # Request Flow
//!
//! 1. If robots.txt is respected, look up the origin's rules (cached per origin)
//!    - Disallowed → `Err(RenderError::Disallowed)`
//! 2. Send GET with the identifying user agent, or a browser profile in stealth mode
//! 3. Map the outcome:
//!
//! | Condition | Output |
//! |-----------|--------|
//! | 2xx | successful render |
//! | other status | structured failure carrying the status |
//! | timeout | structured failure, "timed out" message |
//! | connect / DNS / TLS | structured failure, "connection" message |
//! | body read error | `Err(RenderError::Engine)` |

use crate::config::UserAgentConfig;
use crate::crawler::engine::{EngineFactory, RenderConfig, RenderEngine, RenderError, RenderOutput};
use crate::robots::RobotsCache;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Browser user agent sent in stealth mode
pub const STEALTH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Default redirect budget for page fetches
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client with the identifying user agent
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `max_redirects` - Redirect hops followed before the request fails
///
/// # Example
///
/// ```no_run
/// use sitelens::config::UserAgentConfig;
/// use sitelens::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Sitelens".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, 10).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    max_redirects: usize,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent_string())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

fn stealth_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(STEALTH_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

/// Longest wait for a robots.txt before the page is fetched as if none existed
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Render engine backed by plain HTTP requests
#[derive(Debug)]
pub struct HttpRenderEngine {
    client: Client,
    /// Product token matched against robots.txt user-agent groups
    agent_token: String,
    robots: RobotsCache,
}

impl HttpRenderEngine {
    /// Creates an engine identifying itself with `config`
    pub fn new(config: &UserAgentConfig, max_redirects: usize) -> Result<Self, RenderError> {
        let client = build_http_client(config, max_redirects)
            .map_err(|e| RenderError::Init(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, &config.crawler_name))
    }

    /// Creates an engine over an existing client
    pub fn with_client(client: Client, agent_token: &str) -> Self {
        Self {
            client,
            agent_token: agent_token.to_string(),
            robots: RobotsCache::new(),
        }
    }

    fn transport_failure(url: &str, error: reqwest::Error, timeout: Duration) -> RenderOutput {
        let message = if error.is_timeout() {
            format!("Request timed out after {}s", timeout.as_secs_f64())
        } else if error.is_connect() {
            format!("Connection failed: {}", error.without_url())
        } else if error.is_redirect() {
            format!("Redirect limit exceeded: {}", error.without_url())
        } else {
            error.without_url().to_string()
        };
        RenderOutput::failure(url, None, message)
    }
}

#[async_trait]
impl RenderEngine for HttpRenderEngine {
    async fn render(&self, url: &str, config: &RenderConfig) -> Result<RenderOutput, RenderError> {
        let parsed =
            Url::parse(url).map_err(|e| RenderError::Engine(format!("Invalid URL {}: {}", url, e)))?;

        if config.respect_robots_txt
            && !self
                .robots
                .is_allowed(
                    &self.client,
                    &parsed,
                    &self.agent_token,
                    config.timeout.min(ROBOTS_TIMEOUT),
                )
                .await
        {
            return Err(RenderError::Disallowed {
                url: url.to_string(),
            });
        }

        let mut request = self.client.get(parsed.as_str()).timeout(config.timeout);
        if config.stealth {
            request = request.headers(stealth_headers());
        }

        tracing::trace!("GET {} (stealth: {})", url, config.stealth);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Self::transport_failure(url, e, config.timeout)),
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let html = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return Ok(Self::transport_failure(&final_url, e, config.timeout));
            }
            Err(e) => {
                return Err(RenderError::Engine(format!(
                    "Failed to read response body: {}",
                    e.without_url()
                )));
            }
        };

        let mut output = if status.is_success() {
            RenderOutput::page(&final_url, status.as_u16(), html)
        } else {
            let mut failed = RenderOutput::failure(
                &final_url,
                Some(status.as_u16()),
                format!("HTTP {}", status),
            );
            failed.html = html;
            failed
        };
        output.response_headers = response_headers;

        if config.capture_screenshot {
            tracing::debug!("Screenshots are not available from the HTTP engine");
        }

        Ok(output)
    }
}

/// Creates [`HttpRenderEngine`]s for an [`EngineHandle`](crate::crawler::EngineHandle)
#[derive(Debug, Clone)]
pub struct HttpEngineFactory {
    user_agent: UserAgentConfig,
    max_redirects: usize,
}

impl HttpEngineFactory {
    pub fn new(user_agent: UserAgentConfig) -> Self {
        Self {
            user_agent,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    async fn create(&self) -> Result<Arc<dyn RenderEngine>, RenderError> {
        let engine = HttpRenderEngine::new(&self.user_agent, self.max_redirects)?;
        Ok(Arc::new(engine))
    }
}
