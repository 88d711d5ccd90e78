//! URL handling module for Sitelens
//!
//! This module canonicalizes and validates URLs before they are ever fetched, and
//! provides the host comparison used to split internal from external links.

mod host;
mod normalize;

use crate::config::UrlsConfig;
use crate::UrlError;
use url::Url;

// Re-export main functions
pub use host::{is_valid_host, same_site};
pub use normalize::normalize_url;

/// Outcome of normalizing a list of URLs
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Normalized URLs, in input order
    pub valid: Vec<Url>,

    /// Rejected inputs with the reason each was rejected
    pub invalid: Vec<(String, UrlError)>,
}

/// URL normalizer bound to one set of normalization rules
///
/// # Examples
///
/// ```
/// use sitelens::config::UrlsConfig;
/// use sitelens::url::UrlNormalizer;
///
/// let normalizer = UrlNormalizer::new(UrlsConfig::default());
/// assert!(normalizer.validate("https://example.com/about/"));
/// assert!(!normalizer.validate("https://example.com/brochure.pdf"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    config: UrlsConfig,
}

impl UrlNormalizer {
    /// Creates a normalizer using the given rules
    pub fn new(config: UrlsConfig) -> Self {
        Self { config }
    }

    /// Returns the rules this normalizer applies
    pub fn config(&self) -> &UrlsConfig {
        &self.config
    }

    /// Normalizes one URL, failing with the reason it is not crawlable
    pub fn normalize(&self, raw: &str) -> Result<Url, UrlError> {
        normalize_url(raw, &self.config)
    }

    /// Returns true if the URL would normalize successfully
    pub fn validate(&self, raw: &str) -> bool {
        self.normalize(raw).is_ok()
    }

    /// Normalizes a list of URLs
    ///
    /// With `skip_invalid` set, rejected inputs are collected in
    /// [`BatchOutcome::invalid`]; otherwise the first rejection is returned as the error.
    pub fn normalize_batch<S: AsRef<str>>(
        &self,
        raws: &[S],
        skip_invalid: bool,
    ) -> Result<BatchOutcome, UrlError> {
        let mut outcome = BatchOutcome::default();

        for raw in raws {
            let raw = raw.as_ref();
            match self.normalize(raw) {
                Ok(url) => outcome.valid.push(url),
                Err(e) if skip_invalid => {
                    tracing::debug!("Skipping invalid URL {}: {}", raw, e);
                    outcome.invalid.push((raw.to_string(), e));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }
}
