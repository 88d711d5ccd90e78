//! Error classification and retry policy
//!
//! Maps a failure signal (message plus optional HTTP status) to an [`ErrorCategory`],
//! and derives from the category whether to retry, how long to back off, and how the
//! next attempt should be configured.
//!
//! # Status Codes
//!
//! Status codes take precedence over message inspection:
//!
//! | Status | Category | Retry |
//! |--------|----------|-------|
//! | 404 | ClientError | no |
//! | 403 | BotDetection | yes |
//! | other 4xx | ClientError | no |
//! | 5xx | ServerError | yes |
//!
//! Anything else falls through to keyword matching on the lower-cased message, and an
//! unrecognized message is classified `Unknown` and retried.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Closed set of failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    ClientError,
    ServerError,
    BotDetection,
    Parsing,
    Unknown,
}

impl ErrorCategory {
    /// Whether failures in this category are worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientError)
    }

    /// Whether the next attempt should get a longer timeout
    pub fn should_increase_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::Parsing)
    }

    /// Whether the next attempt should render in stealth mode
    pub fn should_use_stealth(&self) -> bool {
        matches!(self, Self::BotDetection)
    }

    /// Backoff multiplier and ceiling (seconds) for this category
    fn backoff_profile(&self) -> (f64, f64) {
        match self {
            Self::Network => (1.0, 16.0),
            Self::Timeout => (2.0, 30.0),
            Self::ServerError => (3.0, 45.0),
            Self::BotDetection => (4.0, 60.0),
            _ => (1.0, 16.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ClientError => "client_error",
            Self::ServerError => "server_error",
            Self::BotDetection => "bot_detection",
            Self::Parsing => "parsing",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub should_retry: bool,
}

impl Classification {
    fn of(category: ErrorCategory) -> Self {
        Self {
            category,
            should_retry: category.is_retryable(),
        }
    }
}

const NETWORK_KEYWORDS: &[&str] = &[
    "connection",
    "network",
    "dns",
    "name resolution",
    "name or service not known",
    "could not resolve",
    "refused",
    "reset by peer",
    "unreachable",
    "ssl",
    "tls",
    "certificate",
    "handshake",
    "err_name_not_resolved",
    "err_connection",
];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "deadline exceeded", "took too long"];

const BOT_KEYWORDS: &[&str] = &[
    "blocked",
    "captcha",
    "forbidden",
    "access denied",
    "cloudflare",
    "bot detection",
    "bot protection",
    "are you a robot",
    "unusual traffic",
    "security check",
    "challenge",
];

const PARSING_KEYWORDS: &[&str] = &[
    "parse",
    "parsing",
    "javascript error",
    "script error",
    "syntaxerror",
    "syntax error",
    "malformed",
    "decode",
    "invalid html",
];

/// Classifies a failure into a category and retry decision
///
/// Total: every `(message, status_code)` pair yields exactly one classification.
///
/// # Examples
///
/// ```
/// use sitelens::crawler::{classify, ErrorCategory};
///
/// let c = classify("Not Found", Some(404));
/// assert_eq!(c.category, ErrorCategory::ClientError);
/// assert!(!c.should_retry);
///
/// let c = classify("net::ERR_CONNECTION_RESET", None);
/// assert_eq!(c.category, ErrorCategory::Network);
/// assert!(c.should_retry);
/// ```
pub fn classify(message: &str, status_code: Option<u16>) -> Classification {
    if let Some(category) = status_code.and_then(category_for_status) {
        return Classification::of(category);
    }

    let lowered = message.to_lowercase();
    let matches_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let category = if matches_any(NETWORK_KEYWORDS) {
        ErrorCategory::Network
    } else if matches_any(TIMEOUT_KEYWORDS) {
        ErrorCategory::Timeout
    } else if matches_any(BOT_KEYWORDS) {
        ErrorCategory::BotDetection
    } else if matches_any(PARSING_KEYWORDS) {
        ErrorCategory::Parsing
    } else {
        ErrorCategory::Unknown
    };

    Classification::of(category)
}

fn category_for_status(status: u16) -> Option<ErrorCategory> {
    match status {
        404 => Some(ErrorCategory::ClientError),
        403 => Some(ErrorCategory::BotDetection),
        400..=499 => Some(ErrorCategory::ClientError),
        500..=599 => Some(ErrorCategory::ServerError),
        _ => None,
    }
}

/// Backoff before the attempt after `attempt` failed in `category`
///
/// The base delay is `2^attempt` seconds, scaled and capped per category
/// (Network ×1 ≤16s, Timeout ×2 ≤30s, ServerError ×3 ≤45s, BotDetection ×4 ≤60s,
/// everything else ×1 ≤16s).
pub fn retry_delay(attempt: u32, category: ErrorCategory) -> Duration {
    let (multiplier, cap) = category.backoff_profile();
    let base = 2f64.powi(attempt.min(16) as i32);
    Duration::from_secs_f64((base * multiplier).min(cap))
}

/// User-facing explanation for a failed page
pub fn human_message(category: ErrorCategory, original: &str) -> String {
    match category {
        ErrorCategory::Network => {
            "Could not connect to the website. Check that the URL is reachable.".to_string()
        }
        ErrorCategory::Timeout => {
            "The page took too long to load, even after extending the timeout.".to_string()
        }
        ErrorCategory::ClientError => {
            "The page could not be found or is not accessible (client error).".to_string()
        }
        ErrorCategory::ServerError => {
            "The website returned a server error. It may be temporarily unavailable.".to_string()
        }
        ErrorCategory::BotDetection => {
            "The website blocked automated access (bot protection).".to_string()
        }
        ErrorCategory::Parsing => "The page content could not be processed.".to_string(),
        ErrorCategory::Unknown => {
            let truncated: String = original.chars().take(100).collect();
            format!("Unexpected error: {}", truncated)
        }
    }
}
