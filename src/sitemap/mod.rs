//! Sitemap resolution
//!
//! Fetches an XML sitemap and flattens it into the list of page URLs to crawl.
//! Sitemap indexes are expanded recursively, with nested sitemaps fetched
//! concurrently.
//!
//! # Failure Policy
//!
//! | Condition | Outcome |
//! |-----------|---------|
//! | HTTP 403 / 429 | [`SitemapError::BotProtection`], never retried |
//! | nested sitemap fails | branch contributes no URLs, resolution continues |
//! | depth exceeds the limit | [`SitemapError::DepthExceeded`], whole resolution fails |
//! | several top-level sitemaps | fails only when every one of them fails |

mod parser;

pub use parser::{is_nested_sitemap, parse_sitemap, SitemapDocument};

use crate::config::{SitemapConfig, UserAgentConfig};
use futures::future::{join_all, BoxFuture};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Prefix carried by every bot-protection error message
pub const BOT_PROTECTION_PREFIX: &str = "BOT_PROTECTION:";

/// Errors raised while resolving sitemaps
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Invalid sitemap URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to fetch sitemap {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Sitemap {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("BOT_PROTECTION: {url} returned HTTP {status}; the site blocks automated access, add page URLs manually")]
    BotProtection { url: String, status: u16 },

    #[error("Failed to parse sitemap {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Sitemap nesting at {url} exceeds the maximum depth of {max_depth}")]
    DepthExceeded { url: String, max_depth: u32 },

    #[error("All sitemaps failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    AllFailed(Vec<SitemapError>),
}

impl SitemapError {
    /// Whether the caller should offer manual URL entry instead of retrying
    pub fn is_bot_protection(&self) -> bool {
        match self {
            Self::BotProtection { .. } => true,
            Self::AllFailed(errors) => errors.iter().any(Self::is_bot_protection),
            _ => false,
        }
    }
}

type SitemapResult<T> = std::result::Result<T, SitemapError>;

/// Builds the HTTP client used for sitemap and robots.txt requests
pub fn build_sitemap_client(
    user_agent: &UserAgentConfig,
    config: &SitemapConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.user_agent_string())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Resolves sitemaps into page URL lists
#[derive(Debug, Clone)]
pub struct SitemapResolver {
    client: Client,
    config: SitemapConfig,
}

impl SitemapResolver {
    /// Creates a resolver identifying itself with `user_agent`
    pub fn new(user_agent: &UserAgentConfig, config: SitemapConfig) -> SitemapResult<Self> {
        let client = build_sitemap_client(user_agent, &config).map_err(|e| SitemapError::Fetch {
            url: String::new(),
            message: format!("failed to build HTTP client: {}", e),
        })?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a resolver over an existing client
    pub fn with_client(client: Client, config: SitemapConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SitemapConfig {
        &self.config
    }

    /// Resolves one sitemap recursively up to the configured depth
    pub async fn resolve(&self, url: &str) -> SitemapResult<Vec<String>> {
        self.resolve_with(url, true, self.config.max_depth).await
    }

    /// Resolves one sitemap
    ///
    /// # Arguments
    ///
    /// * `url` - Location of the sitemap or sitemap index
    /// * `recursive` - Expand nested sitemaps; when false they are dropped
    /// * `max_depth` - Deepest nesting level fetched; the top document is depth 0
    ///
    /// # Returns
    ///
    /// Page URLs in document order, de-duplicated.
    pub async fn resolve_with(
        &self,
        url: &str,
        recursive: bool,
        max_depth: u32,
    ) -> SitemapResult<Vec<String>> {
        let urls = self.resolve_at(url.to_string(), 0, recursive, max_depth).await?;
        let mut seen = HashSet::new();
        let unique: Vec<String> = urls.into_iter().filter(|u| seen.insert(u.clone())).collect();
        tracing::info!("Resolved {} URLs from sitemap {}", unique.len(), url);
        Ok(unique)
    }

    /// Resolves several independent sitemaps
    ///
    /// Fails only when all of them fail; a single sitemap's error is returned as is.
    pub async fn resolve_many<S: AsRef<str>>(&self, urls: &[S]) -> SitemapResult<Vec<String>> {
        let results = join_all(urls.iter().map(|url| self.resolve(url.as_ref()))).await;

        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(found) => resolved.extend(found),
                Err(e) => {
                    tracing::warn!("Sitemap {} failed: {}", url.as_ref(), e);
                    errors.push(e);
                }
            }
        }

        if !urls.is_empty() && errors.len() == urls.len() {
            return Err(match errors.len() {
                1 => errors.remove(0),
                _ => SitemapError::AllFailed(errors),
            });
        }

        let mut seen = HashSet::new();
        Ok(resolved.into_iter().filter(|u| seen.insert(u.clone())).collect())
    }

    /// Finds sitemap locations for a site
    ///
    /// Uses the `Sitemap:` lines of the site's robots.txt, falling back to
    /// `/sitemap.xml` at the site root.
    pub async fn discover(&self, site_url: &str) -> SitemapResult<Vec<String>> {
        let site = Url::parse(site_url).map_err(|e| SitemapError::InvalidUrl {
            url: site_url.to_string(),
            message: e.to_string(),
        })?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let listed = crate::robots::fetch_robots(&self.client, &site, timeout)
            .await
            .sitemaps();
        if !listed.is_empty() {
            tracing::debug!("robots.txt lists {} sitemaps for {}", listed.len(), site);
            return Ok(listed);
        }

        let fallback = site.join("/sitemap.xml").map_err(|e| SitemapError::InvalidUrl {
            url: site_url.to_string(),
            message: e.to_string(),
        })?;
        Ok(vec![fallback.into()])
    }

    fn resolve_at(
        &self,
        url: String,
        depth: u32,
        recursive: bool,
        max_depth: u32,
    ) -> BoxFuture<'_, SitemapResult<Vec<String>>> {
        Box::pin(async move {
            if depth > max_depth {
                return Err(SitemapError::DepthExceeded { url, max_depth });
            }

            let body = self.fetch(&url).await?;
            let document = parse_sitemap(&body).map_err(|message| SitemapError::Parse {
                url: url.clone(),
                message,
            })?;

            let entries = match document {
                SitemapDocument::UrlSet(urls) => {
                    tracing::debug!("Sitemap {} lists {} pages", url, urls.len());
                    return Ok(urls);
                }
                SitemapDocument::Index(entries) => entries,
            };

            let (nested, mut pages): (Vec<String>, Vec<String>) =
                entries.into_iter().partition(|entry| is_nested_sitemap(entry));
            tracing::debug!(
                "Sitemap index {} at depth {} has {} nested sitemaps",
                url,
                depth,
                nested.len()
            );

            if !recursive {
                return Ok(pages);
            }

            let branches = join_all(
                nested
                    .iter()
                    .map(|child| self.resolve_at(child.clone(), depth + 1, recursive, max_depth)),
            )
            .await;

            for (child, branch) in nested.iter().zip(branches) {
                match branch {
                    Ok(urls) => pages.extend(urls),
                    Err(e @ SitemapError::DepthExceeded { .. }) => return Err(e),
                    Err(e) => tracing::warn!("Skipping nested sitemap {}: {}", child, e),
                }
            }

            Ok(pages)
        })
    }

    async fn fetch(&self, url: &str) -> SitemapResult<String> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| SitemapError::Fetch {
                url: url.to_string(),
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SitemapError::BotProtection {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SitemapError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| SitemapError::Fetch {
            url: url.to_string(),
            message: e.without_url().to_string(),
        })
    }
}
