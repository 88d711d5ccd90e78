use serde::Deserialize;

/// Main configuration structure for Sitelens
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub urls: UrlsConfig,
    #[serde(default)]
    pub sitemap: SitemapConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of attempts per page (including the first)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Maximum number of pages rendered at the same time
    pub concurrency: usize,

    /// Fetch timeout for pages that match no slow/medium bucket (seconds)
    #[serde(rename = "base-timeout-secs")]
    pub base_timeout_secs: u64,

    /// Ask the render engine for a screenshot of every page
    #[serde(rename = "capture-screenshots")]
    pub capture_screenshots: bool,

    /// Skip pages that the site's robots.txt disallows
    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            concurrency: 3,
            base_timeout_secs: 30,
            capture_screenshots: false,
            respect_robots_txt: true,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the identifying user agent: `Name/Version (+ContactURL; ContactEmail)`
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Pacing between pages of one crawl run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Lower bound of the politeness jitter (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the politeness jitter (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Base of the throttle backoff, doubled per consecutive throttle (seconds)
    #[serde(rename = "throttle-base-secs")]
    pub throttle_base_secs: u64,

    /// Ceiling of the throttle backoff (seconds)
    #[serde(rename = "throttle-cap-secs")]
    pub throttle_cap_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            throttle_base_secs: 2,
            throttle_cap_secs: 60,
        }
    }
}

/// URL normalization rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UrlsConfig {
    /// Keep `#fragment` parts instead of dropping them
    #[serde(rename = "keep-fragment")]
    pub keep_fragment: bool,

    /// Longest URL accepted, after normalization
    #[serde(rename = "max-length")]
    pub max_length: usize,

    /// File extensions that never point at a crawlable page
    #[serde(rename = "blocked-extensions")]
    pub blocked_extensions: Vec<String>,
}

/// Extensions rejected by default: documents, archives, media, and asset files
pub const DEFAULT_BLOCKED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "rtf", "zip", "rar", "7z",
    "tar", "gz", "bz2", "xz", "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "tiff",
    "mp3", "mp4", "avi", "mov", "wmv", "webm", "wav", "ogg", "flac", "css", "js", "json", "xml",
    "csv", "txt", "woff", "woff2", "ttf", "eot", "exe", "dmg",
];

impl Default for UrlsConfig {
    fn default() -> Self {
        Self {
            keep_fragment: false,
            max_length: 2048,
            blocked_extensions: DEFAULT_BLOCKED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Sitemap resolution limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SitemapConfig {
    /// How many levels of nested sitemap indexes are followed
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Redirect hops allowed when fetching one sitemap document
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    /// Fetch timeout for one sitemap document (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_redirects: 10,
            timeout_secs: 30,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory that receives page screenshots
    #[serde(rename = "screenshot-dir")]
    pub screenshot_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./sitelens.db".to_string(),
            screenshot_dir: "./screenshots".to_string(),
        }
    }
}
