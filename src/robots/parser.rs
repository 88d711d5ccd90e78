//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; `Sitemap:` lines are
//! read directly since they are independent of user-agent groups.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content; `None` means allow everything
    content: Option<String>,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when robots.txt is missing or cannot be fetched.
    pub fn allow_all() -> Self {
        Self { content: None }
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The URL (or path) to check
    /// * `user_agent` - The product token of the crawler, e.g. `Sitelens`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self.content.as_deref() {
            None | Some("") => true,
            Some(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
        }
    }

    /// Sitemap URLs announced with `Sitemap:` lines, in file order
    pub fn sitemaps(&self) -> Vec<String> {
        let Some(content) = self.content.as_deref() else {
            return Vec::new();
        };

        content
            .lines()
            .filter_map(|line| {
                let (key, value) = line.trim().split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("sitemap")
                    .then(|| value.trim().to_string())
            })
            .filter(|value| !value.is_empty())
            .collect()
    }
}
