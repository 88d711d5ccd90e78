//! Internal and external link extractors
//!
//! Both walk every `<a href>` once, resolve it against the page URL, and split by
//! whether the target host belongs to the same site as the page (a leading `www.` is
//! ignored on both sides). Links are de-duplicated by their fragment-stripped URL;
//! the first occurrence wins and keeps its position.

use super::{element_text, resolve_href, truncate_chars};
use crate::extract::pipeline::{ExtractError, Extractor, Page};
use crate::extract::value::{DataValue, Link};
use crate::url::same_site;
use scraper::Selector;
use std::collections::HashSet;

const MAX_ANCHOR_TEXT_CHARS: usize = 200;

/// Hrefs that never point at a crawlable document
const SKIPPED_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Internal,
    External,
}

fn collect_links(page: &Page<'_>, side: Side) -> Result<Option<DataValue>, ExtractError> {
    let selector = Selector::parse("a[href]")
        .map_err(|e| ExtractError::Failed(format!("anchor selector: {:?}", e)))?;
    let page_host = page.url.host_str().unwrap_or_default();

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for (position, anchor) in page.document.select(&selector).enumerate() {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let lowered = href.to_ascii_lowercase();
        if href.starts_with('#') || SKIPPED_SCHEMES.iter().any(|s| lowered.starts_with(s)) {
            continue;
        }

        let Some(mut target) = resolve_href(page.url, href) else {
            continue;
        };
        target.set_fragment(None);

        let internal = same_site(target.host_str().unwrap_or_default(), page_host);
        if internal != (side == Side::Internal) {
            continue;
        }

        let url = String::from(target);
        if !seen.insert(url.clone()) {
            continue;
        }

        let nofollow = anchor
            .value()
            .attr("rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("nofollow"))
            })
            .unwrap_or(false);

        links.push(Link {
            url,
            text: truncate_chars(&element_text(&anchor), MAX_ANCHOR_TEXT_CHARS),
            position,
            nofollow,
        });
    }

    Ok((!links.is_empty()).then_some(DataValue::Links(links)))
}

/// Links to pages on the same site
pub struct InternalLinks;

impl Extractor for InternalLinks {
    fn name(&self) -> &str {
        "internal_links"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        collect_links(page, Side::Internal)
    }
}

/// Links leaving the site, with their no-follow flag
pub struct ExternalLinks;

impl Extractor for ExternalLinks {
    fn name(&self) -> &str {
        "external_links"
    }

    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
        collect_links(page, Side::External)
    }
}
