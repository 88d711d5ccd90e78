//! Robots.txt handling module
//!
//! Fetches, parses, and caches robots.txt per origin. The HTTP render engine consults
//! it before every page request when robots.txt is respected, and the sitemap
//! discovery path reads its `Sitemap:` lines.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Fetches and parses `{origin}/robots.txt` for the origin of `url`
///
/// A missing file, a non-success status, a transport error, or no answer within
/// `timeout` all yield [`ParsedRobots::allow_all`].
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - Any URL on the origin whose robots.txt is wanted
/// * `timeout` - Limit for the whole request, body included
pub async fn fetch_robots(client: &Client, url: &Url, timeout: Duration) -> ParsedRobots {
    let Ok(robots_url) = url.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    match client.get(robots_url.as_str()).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!("{} returned {}, allowing all", robots_url, response.status());
            ParsedRobots::allow_all()
        }
        Err(e) if e.is_timeout() => {
            tracing::warn!("{} did not answer within {:?}, allowing all", robots_url, timeout);
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::debug!("Failed to fetch {}: {}", robots_url, e.without_url());
            ParsedRobots::allow_all()
        }
    }
}

/// Per-origin robots.txt cache shared by concurrent page fetches
///
/// Entries are never evicted, only refreshed when stale, so the cache holds one entry
/// per origin seen. It lives inside one render engine, and the engine is dropped when
/// its batch ends, so the size is bounded by the origins of a single batch.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the robots rules for the origin of `url`, fetching them when absent or stale
    ///
    /// The lock is not held while fetching; two tasks racing on a cold origin may both
    /// fetch, and the later insert wins.
    pub async fn rules_for(&self, client: &Client, url: &Url, timeout: Duration) -> ParsedRobots {
        let origin = url.origin().ascii_serialization();

        if let Some(cached) = self.entries.lock().await.get(&origin) {
            if !cached.is_stale() {
                return cached.content.clone();
            }
        }

        let rules = fetch_robots(client, url, timeout).await;
        self.entries
            .lock()
            .await
            .insert(origin, CachedRobots::new(rules.clone()));
        rules
    }

    /// Checks whether `url` may be fetched by the crawler identified by `agent_token`
    pub async fn is_allowed(
        &self,
        client: &Client,
        url: &Url,
        agent_token: &str,
        timeout: Duration,
    ) -> bool {
        self.rules_for(client, url, timeout)
            .await
            .is_allowed(url.as_str(), agent_token)
    }

    /// Number of cached origins
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_url(path: &str) -> Url {
        // Bind then drop a listener so nothing answers on the port
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        Url::parse(&format!("http://127.0.0.1:{}{}", port, path)).unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_origin_allows_all() {
        let client = Client::new();
        let url = closed_port_url("/private/page");
        let rules = fetch_robots(&client, &url, Duration::from_secs(2)).await;
        assert!(rules.is_allowed(url.as_str(), "TestBot"));
    }

    #[tokio::test]
    async fn test_cache_holds_one_entry_per_origin() {
        let client = Client::new();
        let cache = RobotsCache::new();
        assert!(cache.is_empty().await);

        let page = closed_port_url("/a");
        let sibling = page.join("/b").unwrap();
        let other = Url::parse(&format!("http://localhost:{}/a", page.port().unwrap())).unwrap();

        let timeout = Duration::from_secs(2);
        assert!(cache.is_allowed(&client, &page, "TestBot", timeout).await);
        assert!(cache.is_allowed(&client, &sibling, "TestBot", timeout).await);
        assert_eq!(cache.len().await, 1);

        cache.rules_for(&client, &other, timeout).await;
        assert_eq!(cache.len().await, 2);
    }
}
