//! Extraction module
//!
//! Turns rendered HTML into a catalogue of named SEO data points through the
//! [`ExtractionPipeline`].

pub mod extractors;
mod pipeline;
mod value;

pub use extractors::{body_text, collapse_whitespace, visible_text};
pub use pipeline::{
    ExtractError, Extraction, ExtractionPipeline, ExtractionSummary, Extractor, ExtractorFailure,
    ExtractorTiming, Page,
};
pub use value::{Alternate, DataPoints, DataValue, Heading, Link};
