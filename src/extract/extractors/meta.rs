//! Head metadata extractors: titles, description, canonical, alternates, robots

use super::{first_text, meta_content, resolve_href, truncate_chars};
use crate::extract::pipeline::{ExtractError, Extractor, Page};
use crate::extract::value::{Alternate, DataValue};
use scraper::Selector;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MIN_FALLBACK_PARAGRAPH_CHARS: usize = 50;

const OG_TITLE: &str = r#"meta[property="og:title"], meta[name="og:title"]"#;
const TWITTER_TITLE: &str = r#"meta[name="twitter:title"], meta[property="twitter:title"]"#;
const OG_DESCRIPTION: &str = r#"meta[property="og:description"], meta[name="og:description"]"#;
const TWITTER_DESCRIPTION: &str =
    r#"meta[name="twitter:description"], meta[property="twitter:description"]"#;

fn text(value: Option<String>) -> Result<Option<DataValue>, ExtractError> {
    Ok(value.map(DataValue::Text))
}

/// `<title>`, then the Open Graph title, then the first `<h1>`
pub struct PageTitle;

impl Extractor for PageTitle {
    fn name(&self) -> &str {
        "page_title"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let title = first_text(page.document, "title")
            .or_else(|| meta_content(page.document, OG_TITLE))
            .or_else(|| first_text(page.document, "h1"));
        text(title.map(|t| truncate_chars(&t, MAX_TITLE_CHARS)))
    }
}

/// Social title tags, then `<meta name="title">`, then `<title>`
pub struct MetaTitle;

impl Extractor for MetaTitle {
    fn name(&self) -> &str {
        "meta_title"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let title = meta_content(page.document, OG_TITLE)
            .or_else(|| meta_content(page.document, TWITTER_TITLE))
            .or_else(|| meta_content(page.document, r#"meta[name="title"]"#))
            .or_else(|| first_text(page.document, "title"));
        text(title.map(|t| truncate_chars(&t, MAX_TITLE_CHARS)))
    }
}

/// Social descriptions, then `<meta name="description">`, then the first substantial paragraph
pub struct MetaDescription;

impl Extractor for MetaDescription {
    fn name(&self) -> &str {
        "meta_description"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let description = meta_content(page.document, OG_DESCRIPTION)
            .or_else(|| meta_content(page.document, TWITTER_DESCRIPTION))
            .or_else(|| meta_content(page.document, r#"meta[name="description"]"#))
            .or_else(|| first_paragraph(page));
        text(description.map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS)))
    }
}

fn first_paragraph(page: &Page<'_>) -> Option<String> {
    let selector = Selector::parse("p").ok()?;
    page.document
        .select(&selector)
        .map(|p| super::element_text(&p))
        .find(|p| p.chars().count() >= MIN_FALLBACK_PARAGRAPH_CHARS)
}

/// Text of the first `<h1>`
pub struct FirstHeading;

impl Extractor for FirstHeading {
    fn name(&self) -> &str {
        "h1"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        text(first_text(page.document, "h1"))
    }
}

/// `<link rel="canonical">` resolved against the page URL
pub struct CanonicalUrl;

impl Extractor for CanonicalUrl {
    fn name(&self) -> &str {
        "canonical_url"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let Ok(selector) = Selector::parse(r#"link[rel~="canonical"][href]"#) else {
            return Ok(None);
        };
        let canonical = page
            .document
            .select(&selector)
            .filter_map(|link| link.value().attr("href"))
            .find_map(|href| resolve_href(page.url, href));
        text(canonical.map(String::from))
    }
}

/// `<link rel="alternate" hreflang>` entries as `{language, url}`
pub struct Hreflang;

impl Extractor for Hreflang {
    fn name(&self) -> &str {
        "hreflang"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let Ok(selector) = Selector::parse(r#"link[rel~="alternate"][hreflang][href]"#) else {
            return Ok(None);
        };

        let alternates: Vec<Alternate> = page
            .document
            .select(&selector)
            .filter_map(|link| {
                let language = link.value().attr("hreflang")?.trim();
                let url = resolve_href(page.url, link.value().attr("href")?)?;
                (!language.is_empty()).then(|| Alternate {
                    language: language.to_string(),
                    url: url.into(),
                })
            })
            .collect();

        Ok((!alternates.is_empty()).then_some(DataValue::Alternates(alternates)))
    }
}

/// `robots` and `googlebot` meta directives combined into one string
///
/// Both present: `"noindex, follow; googlebot: nosnippet"`.
pub struct MetaRobots;

impl Extractor for MetaRobots {
    fn name(&self) -> &str {
        "meta_robots"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let robots = meta_content(page.document, r#"meta[name="robots"]"#);
        let googlebot = meta_content(page.document, r#"meta[name="googlebot"]"#);

        let combined = match (robots, googlebot) {
            (Some(robots), Some(googlebot)) => Some(format!("{}; googlebot: {}", robots, googlebot)),
            (Some(robots), None) => Some(robots),
            (None, Some(googlebot)) => Some(format!("googlebot: {}", googlebot)),
            (None, None) => None,
        };
        text(combined)
    }
}
