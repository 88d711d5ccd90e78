//! Extraction pipeline
//!
//! An ordered registry of [`Extractor`]s. Each run parses the HTML once and passes the
//! document to every extractor through the same guarded sequence:
//!
//! 1. `extract`: produce a value, or `None` when the data point is absent
//! 2. `validate`: reject an implausible value
//! 3. `sanitize`: normalize the accepted value
//!
//! An error or a panic at any stage degrades that one data point to absent and is
//! recorded in the run's [`ExtractionSummary`]; the remaining extractors still run.

use crate::extract::extractors::{collapse_whitespace, default_extractors};
use crate::extract::value::{DataPoints, DataValue};
use scraper::Html;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use url::Url;

/// Errors an extractor can report for one page
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Failed(String),

    #[error("value rejected by validation")]
    Rejected,

    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// Rendered page handed to every extractor
pub struct Page<'a> {
    /// Parsed document
    pub document: &'a Html,
    /// Raw HTML as rendered
    pub html: &'a str,
    /// Final URL of the page
    pub url: &'a Url,
}

/// One named data point producer
pub trait Extractor: Send + Sync {
    /// Data point name, unique within a pipeline
    fn name(&self) -> &str;

    /// Produces the value, `Ok(None)` when the page does not carry it
    fn extract(&self, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError>;

    /// Whether an extracted value is acceptable
    fn validate(&self, _value: &DataValue) -> bool {
        true
    }

    /// Normalizes an accepted value; text is whitespace-collapsed and trimmed
    fn sanitize(&self, value: DataValue) -> DataValue {
        match value {
            DataValue::Text(text) => DataValue::Text(collapse_whitespace(&text)),
            other => other,
        }
    }
}

/// Wall-clock time spent in one extractor
#[derive(Debug, Clone, Serialize)]
pub struct ExtractorTiming {
    pub name: String,
    pub elapsed_ms: f64,
}

/// One extractor failure
#[derive(Debug, Clone, Serialize)]
pub struct ExtractorFailure {
    pub name: String,
    pub message: String,
}

/// Bookkeeping for one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionSummary {
    /// Extractors that produced a value
    pub successful: usize,
    /// Extractors that ran
    pub total: usize,
    pub timings: Vec<ExtractorTiming>,
    pub errors: Vec<ExtractorFailure>,
}

/// Data points plus bookkeeping for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub data: DataPoints,
    pub summary: ExtractionSummary,
}

/// Ordered extractor registry
pub struct ExtractionPipeline {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractionPipeline {
    /// A pipeline with no extractors
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// A pipeline with the standard SEO catalogue registered
    pub fn new() -> Self {
        let mut pipeline = Self::empty();
        for extractor in default_extractors() {
            pipeline.register_boxed(extractor);
        }
        pipeline
    }

    /// Registers an extractor at the end of the run order
    ///
    /// An extractor with an already registered name replaces the old one in place.
    pub fn register<E: Extractor + 'static>(&mut self, extractor: E) -> &mut Self {
        self.register_boxed(Box::new(extractor))
    }

    pub fn register_boxed(&mut self, extractor: Box<dyn Extractor>) -> &mut Self {
        match self
            .extractors
            .iter_mut()
            .find(|existing| existing.name() == extractor.name())
        {
            Some(slot) => *slot = extractor,
            None => self.extractors.push(extractor),
        }
        self
    }

    /// Registered names in run order
    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Runs every registered extractor
    ///
    /// Never fails: the returned data holds exactly one entry per extractor.
    pub fn extract_all(&self, html: &str, url: &Url) -> Extraction {
        self.run(html, url, |_| true)
    }

    /// Runs only the named extractors, still in registration order
    ///
    /// Names that are not registered are ignored.
    pub fn extract_selected<S: AsRef<str>>(&self, html: &str, url: &Url, names: &[S]) -> Extraction {
        for name in names {
            if !self.extractors.iter().any(|e| e.name() == name.as_ref()) {
                tracing::debug!("No extractor registered for data point '{}'", name.as_ref());
            }
        }
        self.run(html, url, |extractor| {
            names.iter().any(|name| name.as_ref() == extractor.name())
        })
    }

    fn run<F>(&self, html: &str, url: &Url, selected: F) -> Extraction
    where
        F: Fn(&dyn Extractor) -> bool,
    {
        let document = Html::parse_document(html);
        let page = Page {
            document: &document,
            html,
            url,
        };

        let mut extraction = Extraction::default();
        for extractor in self.extractors.iter().filter(|extractor| selected(&***extractor)) {
            let name = extractor.name().to_string();
            let started = Instant::now();
            let outcome = run_guarded(&**extractor, &page);
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            let value = match outcome {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Extractor '{}' failed on {}: {}", name, url, e);
                    extraction.summary.errors.push(ExtractorFailure {
                        name: name.clone(),
                        message: e.to_string(),
                    });
                    None
                }
            };

            extraction.summary.total += 1;
            if value.is_some() {
                extraction.summary.successful += 1;
            }
            extraction.summary.timings.push(ExtractorTiming {
                name: name.clone(),
                elapsed_ms,
            });
            extraction.data.insert(name, value);
        }

        tracing::debug!(
            "Extracted {}/{} data points from {}",
            extraction.summary.successful,
            extraction.summary.total,
            url
        );
        extraction
    }
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("extractors", &self.names())
            .finish()
    }
}

/// Runs extract, validate and sanitize, converting panics into errors
fn run_guarded(extractor: &dyn Extractor, page: &Page<'_>) -> Result<Option<DataValue>, ExtractError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<Option<DataValue>, ExtractError> {
        let Some(value) = extractor.extract(page)? else {
            return Ok(None);
        };
        if !extractor.validate(&value) {
            return Err(ExtractError::Rejected);
        }
        let value = extractor.sanitize(value);
        Ok((!value.is_empty()).then_some(value))
    }));

    outcome.unwrap_or_else(|payload| Err(ExtractError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
