//! Body content extractors: visible text, outline, word count, slug

use super::{collapse_whitespace, element_text, truncate_chars};
use crate::extract::pipeline::{ExtractError, Extractor, Page};
use crate::extract::value::{DataValue, Heading};
use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose subtrees never count as visible body text
const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "footer", "header", "aside", "svg",
    "iframe",
];

const MIN_BODY_CHARS: usize = 50;
const MAX_HEADING_CHARS: usize = 200;

/// Visible text of `<body>` (or the whole document) with boilerplate regions removed
pub fn visible_text(document: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                raw.push_str(text);
                raw.push(' ');
            }
            Node::Element(element) if NON_CONTENT_TAGS.contains(&element.name()) => {}
            Node::Element(_) | Node::Document | Node::Fragment => {
                // Reversed so that popping visits children in document order
                let children: Vec<_> = node.children().collect();
                stack.extend(children.into_iter().rev());
            }
            _ => {}
        }
    }

    collapse_whitespace(&raw)
}

/// Main body text, or `None` when fewer than 50 characters remain
pub fn body_text(document: &Html) -> Option<String> {
    let text = visible_text(document);
    (text.chars().count() >= MIN_BODY_CHARS).then_some(text)
}

/// Main visible text of the page
pub struct BodyContent;

impl Extractor for BodyContent {
    fn name(&self) -> &str {
        "body_content"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        Ok(body_text(page.document).map(DataValue::Text))
    }
}

/// `h1`–`h6` outline in document order
pub struct Headings;

impl Extractor for Headings {
    fn name(&self) -> &str {
        "headings"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let selector = Selector::parse("h1, h2, h3, h4, h5, h6")
            .map_err(|e| ExtractError::Failed(format!("heading selector: {:?}", e)))?;

        let headings: Vec<Heading> = page
            .document
            .select(&selector)
            .filter_map(|element| {
                let text = element_text(&element);
                let level = heading_level(&element)?;
                (!text.is_empty()).then(|| (level, truncate_chars(&text, MAX_HEADING_CHARS)))
            })
            .enumerate()
            .map(|(position, (level, text))| Heading {
                level,
                text,
                position,
            })
            .collect();

        Ok((!headings.is_empty()).then_some(DataValue::Headings(headings)))
    }
}

fn heading_level(element: &ElementRef<'_>) -> Option<u8> {
    element
        .value()
        .name()
        .strip_prefix('h')?
        .parse()
        .ok()
        .filter(|level| (1..=6).contains(level))
}

/// Whitespace-separated words in the body text
///
/// Computed from [`body_text`] directly, not from the `body_content` data point.
pub struct WordCount;

impl Extractor for WordCount {
    fn name(&self) -> &str {
        "word_count"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let words = body_text(page.document)
            .map(|text| text.split_whitespace().count() as u64)
            .unwrap_or(0);
        Ok((words > 0).then_some(DataValue::Count(words)))
    }
}

/// Path component of the page URL without a trailing slash; the root is `/`
pub struct Slug;

impl Extractor for Slug {
    fn name(&self) -> &str {
        "slug"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        let trimmed = page.url.path().trim_end_matches('/');
        let slug = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(Some(DataValue::Text(slug.to_string())))
    }
}
