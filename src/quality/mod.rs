//! Extraction quality validation
//!
//! Scores a page's extracted data points for completeness. Hard issues cost 20 points
//! each and warnings 5, floored at zero:
//!
//! | Tag | Kind | Condition |
//! |-----|------|-----------|
//! | `missing_title` | issue | no page title and no meta title |
//! | `missing_meta_description` | warning | no meta description |
//! | `missing_h1` | warning | no first heading |
//! | `thin_content` | warning | fewer than 50 words |
//! | `canonical_mismatch` | warning | canonical present and not the requested URL |
//!
//! [`dom_rendered_completely`] is a separate structural check on the raw HTML that
//! flags likely-unrendered client-side apps. It does not affect the score.

use crate::config::UrlsConfig;
use crate::extract::{visible_text, DataPoints};
use crate::url::normalize_url;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

const ISSUE_PENALTY: usize = 20;
const WARNING_PENALTY: usize = 5;
const THIN_CONTENT_WORDS: u64 = 50;

/// Visible text shorter than this marks a document as near-empty
const MIN_RENDERED_TEXT_CHARS: usize = 20;

/// Quality problems a page can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueTag {
    MissingTitle,
    MissingMetaDescription,
    MissingH1,
    ThinContent,
    CanonicalMismatch,
}

impl IssueTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::MissingMetaDescription => "missing_meta_description",
            Self::MissingH1 => "missing_h1",
            Self::ThinContent => "thin_content",
            Self::CanonicalMismatch => "canonical_mismatch",
        }
    }
}

impl fmt::Display for IssueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality verdict for one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// `max(0, 100 − 20 × issues − 5 × warnings)`
    pub quality_score: u8,
    pub issues: BTreeSet<IssueTag>,
    pub warnings: BTreeSet<IssueTag>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Builds a report, deriving the score from the tag sets
    pub fn new(issues: BTreeSet<IssueTag>, warnings: BTreeSet<IssueTag>) -> Self {
        Self {
            quality_score: quality_score(issues.len(), warnings.len()),
            issues,
            warnings,
            validated_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty()
    }
}

/// `max(0, 100 − 20 × issues − 5 × warnings)`
///
/// # Examples
///
/// ```
/// use sitelens::quality::quality_score;
///
/// assert_eq!(quality_score(0, 0), 100);
/// assert_eq!(quality_score(1, 2), 70);
/// assert_eq!(quality_score(5, 1), 0);
/// ```
pub fn quality_score(issues: usize, warnings: usize) -> u8 {
    let penalty = issues
        .saturating_mul(ISSUE_PENALTY)
        .saturating_add(warnings.saturating_mul(WARNING_PENALTY));
    100usize.saturating_sub(penalty) as u8
}

/// Scores the data points extracted for `requested_url`
pub fn validate(data: &DataPoints, requested_url: &str) -> ValidationReport {
    let mut issues = BTreeSet::new();
    let mut warnings = BTreeSet::new();

    if data.text("page_title").is_none() && data.text("meta_title").is_none() {
        issues.insert(IssueTag::MissingTitle);
    }
    if data.text("meta_description").is_none() {
        warnings.insert(IssueTag::MissingMetaDescription);
    }
    if data.text("h1").is_none() {
        warnings.insert(IssueTag::MissingH1);
    }
    if data.count("word_count").unwrap_or(0) < THIN_CONTENT_WORDS {
        warnings.insert(IssueTag::ThinContent);
    }
    if let Some(canonical) = data.text("canonical_url") {
        if !same_url(canonical, requested_url) {
            warnings.insert(IssueTag::CanonicalMismatch);
        }
    }

    ValidationReport::new(issues, warnings)
}

/// Compares two URLs after normalization, falling back to trimmed string equality
fn same_url(a: &str, b: &str) -> bool {
    let config = UrlsConfig::default();
    match (normalize_url(a, &config), normalize_url(b, &config)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/'),
    }
}

fn empty_app_root() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?is)<div[^>]*\bid\s*=\s*["']?(root|app|__next|__nuxt)["']?[^>]*>\s*</div>"#)
                .ok()
        })
        .as_ref()
}

const NOSCRIPT_MARKERS: &[&str] = &[
    "enable javascript",
    "javascript is required",
    "javascript is disabled",
    "requires javascript",
];

/// Whether the HTML looks like a fully rendered page
///
/// False for an empty or near-empty document, an empty client-side app root
/// (`root`, `app`, `__next`, `__nuxt`), or a page whose visible text asks the reader
/// to enable JavaScript.
pub fn dom_rendered_completely(html: &str) -> bool {
    if html.trim().is_empty() {
        return false;
    }
    if empty_app_root().is_some_and(|pattern| pattern.is_match(html)) {
        return false;
    }

    let text = visible_text(&Html::parse_document(html));
    if text.chars().count() < MIN_RENDERED_TEXT_CHARS {
        return false;
    }

    let lowered = text.to_lowercase();
    !NOSCRIPT_MARKERS.iter().any(|marker| lowered.contains(marker))
}
