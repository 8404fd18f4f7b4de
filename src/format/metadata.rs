//! Informational metadata handed to the caller alongside pixels.
//!
//! Parsers emit a flat, ordered list of `(key, value)` pairs plus typed
//! calibration values. Calibration is advisory: a field that is missing or
//! does not parse is left as `None`, never an error.

use serde::Serialize;

// =============================================================================
// MetadataValue / MetadataList
// =============================================================================

/// A metadata value: free text or a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<i16> for MetadataValue {
    fn from(value: i16) -> Self {
        MetadataValue::Integer(value as i64)
    }
}

impl From<f32> for MetadataValue {
    fn from(value: f32) -> Self {
        MetadataValue::Float(value as f64)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered key/value list. Setting an existing key replaces its value in
/// place, so the last occurrence wins and first-seen order is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataList {
    entries: Vec<(String, MetadataValue)>,
}

impl MetadataList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Text form of a value, for parsers that re-read their own entries.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Calibration
// =============================================================================

/// Typed calibration values, each present only when parsed successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Calibration {
    /// Physical pixel width in micrometres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_size_x: Option<f64>,
    /// Physical pixel height in micrometres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_size_y: Option<f64>,
    /// Physical section spacing in micrometres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_size_z: Option<f64>,
    /// Acquisition timestamp as recorded by the instrument
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Calibration {
    /// Keep only finite, strictly positive physical sizes.
    pub fn physical_size(value: f64) -> Option<f64> {
        (value.is_finite() && value > 0.0).then_some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.physical_size_x.is_none()
            && self.physical_size_y.is_none()
            && self.physical_size_z.is_none()
            && self.timestamp.is_none()
    }
}

// =============================================================================
// Key/value text blocks
// =============================================================================

/// Parse a line-oriented `key<sep>value` block.
///
/// Keys and values are trimmed. Lines without the separator, or with an
/// empty key, are skipped. Repeated keys keep their first position and
/// take the last value.
pub fn parse_key_value_lines(text: &str, separator: char) -> MetadataList {
    let mut list = MetadataList::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(separator) else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        list.set(key, value.trim());
    }
    list
}

/// Parse a trimmed numeric field, yielding `None` for blanks or junk.
pub fn parse_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.trim().parse().ok()
}
