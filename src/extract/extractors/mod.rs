//! The SEO extractor catalogue
//!
//! Each data point is its own [`Extractor`] implementation so that any one of them
//! can be replaced by registering a different implementation under the same name.

mod content;
mod links;
mod media;
mod meta;

pub use content::{body_text, visible_text, BodyContent, Headings, Slug, WordCount};
pub use links::{ExternalLinks, InternalLinks};
pub use media::{ImageCount, StructuredData};
pub use meta::{CanonicalUrl, FirstHeading, Hreflang, MetaDescription, MetaRobots, MetaTitle, PageTitle};

use crate::extract::pipeline::Extractor;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// The standard catalogue in run order
pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(PageTitle),
        Box::new(MetaTitle),
        Box::new(MetaDescription),
        Box::new(FirstHeading),
        Box::new(CanonicalUrl),
        Box::new(Hreflang),
        Box::new(MetaRobots),
        Box::new(BodyContent),
        Box::new(Headings),
        Box::new(WordCount),
        Box::new(InternalLinks),
        Box::new(ExternalLinks),
        Box::new(ImageCount),
        Box::new(StructuredData),
        Box::new(Slug),
    ]
}

/// Collapses runs of whitespace into single spaces and trims the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max` characters
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Whitespace-collapsed text content of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first element matching `css`, if non-empty
pub(crate) fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(|element| element_text(&element))
        .find(|text| !text.is_empty())
}

/// First non-empty `content` attribute among elements matching `css`
pub(crate) fn meta_content(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

/// Resolves an href against the page URL, keeping only http(s) targets
pub(crate) fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}
