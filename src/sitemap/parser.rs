//! Sitemap XML location extraction
//!
//! Sitemaps in the wild are frequently namespaced (`<ns:url>`), wrapped in CDATA, or
//! slightly malformed, so locations are pulled out with tolerant patterns instead of a
//! strict XML parser. Patterns are tried in order: `<sitemap><loc>` entries (an
//! index), then `<url><loc>` entries (a URL set), each accepting an optional
//! namespace prefix.

use regex::Regex;
use std::sync::OnceLock;

/// What a sitemap document turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// Locations of further sitemap documents
    Index(Vec<String>),
    /// Locations of crawlable pages
    UrlSet(Vec<String>),
}

fn entry_pattern(element: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"(?is)<(?:[\w.-]+:)?{element}\b[^>]*>.*?<(?:[\w.-]+:)?loc\b[^>]*>(.*?)</(?:[\w.-]+:)?loc\s*>"
    ))
    .ok()
}

fn index_entries() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| entry_pattern("sitemap")).as_ref()
}

fn url_entries() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| entry_pattern("url")).as_ref()
}

fn root_element() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)<(?:[\w.-]+:)?(urlset|sitemapindex)\b").ok())
        .as_ref()
}

/// Parses a sitemap or sitemap index document
///
/// Location strings are trimmed, unwrapped from CDATA, and entity-decoded. Returns
/// an error message when the document has neither a `<urlset>` nor a
/// `<sitemapindex>` root.
///
/// # Examples
///
/// ```
/// use sitelens::sitemap::{parse_sitemap, SitemapDocument};
///
/// let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
///   <url><loc> https://example.com/a </loc></url>
/// </urlset>"#;
/// assert_eq!(
///     parse_sitemap(xml).unwrap(),
///     SitemapDocument::UrlSet(vec!["https://example.com/a".to_string()])
/// );
/// ```
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, String> {
    let index = locations(index_entries(), xml);
    if !index.is_empty() {
        return Ok(SitemapDocument::Index(index));
    }

    let urls = locations(url_entries(), xml);
    if !urls.is_empty() {
        return Ok(SitemapDocument::UrlSet(urls));
    }

    match root_element().and_then(|root| root.captures(xml)) {
        Some(captures) if captures[1].eq_ignore_ascii_case("sitemapindex") => {
            Ok(SitemapDocument::Index(Vec::new()))
        }
        Some(_) => Ok(SitemapDocument::UrlSet(Vec::new())),
        None => Err("document has no <urlset> or <sitemapindex> element".to_string()),
    }
}

fn locations(pattern: Option<&Regex>, xml: &str) -> Vec<String> {
    let Some(pattern) = pattern else {
        return Vec::new();
    };
    pattern
        .captures_iter(xml)
        .map(|captures| clean_location(&captures[1]))
        .filter(|loc| !loc.is_empty())
        .collect()
}

fn clean_location(raw: &str) -> String {
    let trimmed = raw.trim();
    let unwrapped = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(trimmed);

    unwrapped
        .trim()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whether an index entry points at another sitemap rather than a page
pub fn is_nested_sitemap(location: &str) -> bool {
    let lowered = location.to_ascii_lowercase();
    let path = lowered.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".xml") || lowered.contains("sitemap")
}
