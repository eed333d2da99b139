//! Extraction data model.
//!
//! Everything here is a plain snapshot of what a page looked like when it was
//! read. None of these types hold a browser handle.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Declares how to find and read one named property from a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub selector: String,
    pub property_name: String,
    #[serde(default)]
    pub multi_valued: bool,
    /// Attribute (or DOM property) read when the element's text is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_fallback: Option<String>,
}

impl FieldRule {
    /// Rule reading the first element matching `selector`.
    pub fn single(property_name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            property_name: property_name.into(),
            multi_valued: false,
            attribute_fallback: None,
        }
    }

    /// Rule reading every element matching `selector`.
    pub fn multi(property_name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            multi_valued: true,
            ..Self::single(property_name, selector)
        }
    }

    pub fn with_fallback(mut self, attribute: impl Into<String>) -> Self {
        self.attribute_fallback = Some(attribute.into());
        self
    }
}

/// Why a single field is missing from an [`ExtractionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FieldFailure {
    SelectorTimeout { waited_ms: u64 },
    SelectorNotFound,
    ReadFailed(String),
    TranscriptUnavailable(String),
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFailure::SelectorTimeout { waited_ms } => {
                write!(f, "selector did not appear within {waited_ms} ms")
            }
            FieldFailure::SelectorNotFound => f.write_str("selector matched no readable element"),
            FieldFailure::ReadFailed(reason) => write!(f, "read failed: {reason}"),
            FieldFailure::TranscriptUnavailable(reason) => {
                write!(f, "transcript unavailable: {reason}")
            }
        }
    }
}

/// One recovered field-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiagnostic {
    pub property: String,
    pub selector: String,
    pub failure: FieldFailure,
}

/// One time-coded line of a video transcript, in on-page reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub timestamp: String,
    pub text: String,
}

/// Outcome of a generic page (or video page) extraction.
///
/// A property that could not be read is absent from `fields`; its reason is
/// listed in `diagnostics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    pub source: String,
    pub retrieved_at: DateTime<Utc>,
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptSegment>>,
    #[serde(default)]
    pub diagnostics: Vec<FieldDiagnostic>,
}

impl ExtractionResult {
    pub fn new(url: &Url) -> Self {
        Self {
            url: url.to_string(),
            source: source_label(url),
            retrieved_at: Utc::now(),
            fields: BTreeMap::new(),
            transcript: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn get(&self, property: &str) -> Option<&[String]> {
        self.fields.get(property).map(Vec::as_slice)
    }

    /// Render the result as `Label: value` lines, the shape handed to the
    /// summarizer as candidate text.
    pub fn to_text(&self) -> String {
        let mut lines = Vec::new();
        for (property, values) in &self.fields {
            let joined = values.join("\n");
            if !joined.trim().is_empty() {
                lines.push(format!("{}: {}", label_for(property), joined));
            }
        }
        if let Some(segments) = &self.transcript {
            let body = segments
                .iter()
                .map(|s| format!("[{}] {}", s.timestamp, s.text))
                .collect::<Vec<_>>()
                .join("\n");
            if !body.is_empty() {
                lines.push(format!("Transcript:\n{body}"));
            }
        }
        lines.join("\n")
    }
}

/// One entry of a parsed feed.
///
/// `published_at` and `minutes_ago` are derived once when the feed is parsed
/// and are absent when the item carries no usable date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub published_at: Option<String>,
    pub minutes_ago: Option<i64>,
    pub link: String,
    pub description: String,
}

/// One search/alert hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertResult {
    pub title: String,
    pub description: String,
    pub url: String,
}

const KNOWN_SOURCES: &[(&str, &str)] = &[
    ("yahoo.com", "Yahoo Finance"),
    ("marketwatch.com", "MarketWatch"),
    ("reuters.com", "Reuters"),
    ("bloomberg.com", "Bloomberg"),
    ("cnbc.com", "CNBC"),
    ("fool.com", "Motley Fool"),
    ("seekingalpha.com", "Seeking Alpha"),
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
];

/// Human-readable label for the site a URL belongs to.
pub fn source_label(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    KNOWN_SOURCES
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| host.trim_start_matches("www.").to_string())
}

fn label_for(property: &str) -> String {
    property
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
