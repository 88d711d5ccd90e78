//! Data point values
//!
//! Every extractor yields at most one [`DataValue`]. A page's values are collected in
//! [`DataPoints`], which keeps the pipeline's registration order and serializes as a
//! JSON object keyed by data point name.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One heading in the page outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    /// 1 through 6
    pub level: u8,
    pub text: String,
    /// Zero-based position in document order
    pub position: usize,
}

/// One hyperlink found on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Absolute URL with the fragment removed
    pub url: String,
    pub text: String,
    /// Zero-based position among the page's anchors
    pub position: usize,
    pub nofollow: bool,
}

/// One alternate-language version of the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alternate {
    pub language: String,
    pub url: String,
}

/// Value produced by an extractor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataValue {
    Text(String),
    Count(u64),
    Headings(Vec<Heading>),
    Links(Vec<Link>),
    Alternates(Vec<Alternate>),
    Json(Vec<serde_json::Value>),
}

impl DataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// Blank text or an empty list
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Count(_) => false,
            Self::Headings(items) => items.is_empty(),
            Self::Links(items) => items.is_empty(),
            Self::Alternates(items) => items.is_empty(),
            Self::Json(items) => items.is_empty(),
        }
    }

    /// Stable JSON rendering used for storage and change detection
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Ordered mapping from data point name to value
///
/// Holds one entry per extractor that ran; an entry whose value is `None` is an
/// absent data point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPoints {
    entries: Vec<(String, Option<DataValue>)>,
}

impl DataPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a data point, replacing an existing entry with the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: Option<DataValue>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// The value of a data point, if present and not absent
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Text value of a data point
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(DataValue::as_text)
    }

    /// Count value of a data point
    pub fn count(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(DataValue::as_count)
    }

    /// Whether an entry exists for `name`, absent or not
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that hold a value
    pub fn present(&self) -> usize {
        self.entries.iter().filter(|(_, value)| value.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&DataValue>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for DataPoints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
