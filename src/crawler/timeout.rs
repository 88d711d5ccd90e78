//! Adaptive timeout heuristic
//!
//! Buckets a URL as slow (e-commerce and client-rendered sites), medium (CMS sites),
//! or default from substrings of the URL, and derives the fetch timeout and the
//! post-load settle time from the bucket.

use std::time::Duration;

/// Hard ceiling on any page timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(120);

const ECOMMERCE_MARKERS: &[&str] = &[
    "shop", "store", "cart", "checkout", "product", "shopify", "woocommerce", "magento",
    "bigcommerce",
];

const JS_FRAMEWORK_MARKERS: &[&str] = &[
    "react", "angular", "vue", "nextjs", "next.js", "nuxt", "gatsby", "svelte", "/app/", "#/",
];

const CMS_MARKERS: &[&str] = &[
    "wordpress", "wp-content", "/wp/", "drupal", "joomla", "squarespace", "wix", "ghost.io",
    "/blog",
];

/// Speed bucket a URL falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteProfile {
    /// Shops: heavy pages with many third-party scripts
    Ecommerce,
    /// Client-rendered apps that build the DOM after load
    JsFramework,
    /// Server-rendered CMS pages
    Cms,
    Default,
}

impl SiteProfile {
    /// Buckets a URL by case-insensitive substring markers
    pub fn for_url(url: &str) -> Self {
        let lowered = url.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

        if has(ECOMMERCE_MARKERS) {
            Self::Ecommerce
        } else if has(JS_FRAMEWORK_MARKERS) {
            Self::JsFramework
        } else if has(CMS_MARKERS) {
            Self::Cms
        } else {
            Self::Default
        }
    }

    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Ecommerce | Self::JsFramework)
    }
}

/// Timeout for fetching `url` on the given attempt
///
/// Slow sites get 60–75s, CMS sites 45s, everything else `base`. Retries inflate the
/// bucket value by `1 + 0.5 × attempt`, and the result never exceeds [`MAX_TIMEOUT`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use sitelens::crawler::timeout_for;
///
/// let base = Duration::from_secs(30);
/// assert_eq!(timeout_for("https://example.com/about", base, 0), base);
/// assert_eq!(timeout_for("https://shop.example.com/", base, 0), Duration::from_secs(75));
/// assert_eq!(timeout_for("https://shop.example.com/", base, 3), Duration::from_secs(120));
/// ```
pub fn timeout_for(url: &str, base: Duration, attempt: u32) -> Duration {
    let bucket = match SiteProfile::for_url(url) {
        SiteProfile::Ecommerce => Duration::from_secs(75),
        SiteProfile::JsFramework => Duration::from_secs(60),
        SiteProfile::Cms => Duration::from_secs(45),
        SiteProfile::Default => base,
    };

    let inflated = bucket.as_secs_f64() * (1.0 + 0.5 * attempt as f64);
    Duration::from_secs_f64(inflated.min(MAX_TIMEOUT.as_secs_f64()))
}

/// Extra settle time given to the render engine after network idle
pub fn wait_time_for(url: &str) -> Duration {
    match SiteProfile::for_url(url) {
        profile if profile.is_slow() => Duration::from_secs_f64(3.0),
        SiteProfile::Cms => Duration::from_secs_f64(2.0),
        _ => Duration::from_secs_f64(1.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(30);

    #[test]
    fn test_buckets() {
        assert_eq!(
            SiteProfile::for_url("https://mystore.example.com/"),
            SiteProfile::Ecommerce
        );
        assert_eq!(
            SiteProfile::for_url("https://example.com/#/dashboard"),
            SiteProfile::JsFramework
        );
        assert_eq!(
            SiteProfile::for_url("https://example.com/WP-CONTENT/x"),
            SiteProfile::Cms
        );
        assert_eq!(
            SiteProfile::for_url("https://example.com/about"),
            SiteProfile::Default
        );
    }

    #[test]
    fn test_bucket_timeouts() {
        assert_eq!(timeout_for("https://example.com/cart", BASE, 0), Duration::from_secs(75));
        assert_eq!(timeout_for("https://react.example.com/", BASE, 0), Duration::from_secs(60));
        assert_eq!(timeout_for("https://example.com/blog/post", BASE, 0), Duration::from_secs(45));
        assert_eq!(timeout_for("https://example.com/", BASE, 1), Duration::from_secs(45));
    }

    #[test]
    fn test_monotonic_and_capped() {
        let urls = [
            "https://example.com/",
            "https://example.com/checkout",
            "https://vue.example.com/",
            "https://example.com/wordpress/",
        ];

        for url in urls {
            let mut previous = Duration::ZERO;
            for attempt in 0..20 {
                let timeout = timeout_for(url, BASE, attempt);
                assert!(timeout >= previous);
                assert!(timeout <= MAX_TIMEOUT);
                previous = timeout;
            }
        }
    }

    #[test]
    fn test_large_base_is_capped() {
        assert_eq!(
            timeout_for("https://example.com/", Duration::from_secs(500), 0),
            MAX_TIMEOUT
        );
    }

    #[test]
    fn test_wait_times() {
        assert_eq!(wait_time_for("https://shop.example.com/"), Duration::from_secs_f64(3.0));
        assert_eq!(wait_time_for("https://example.com/blog"), Duration::from_secs_f64(2.0));
        assert_eq!(wait_time_for("https://example.com/"), Duration::from_secs_f64(1.5));
    }
}
