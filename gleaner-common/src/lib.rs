//! Common types and utilities shared across gleaner crates.
//!
//! This crate defines the extraction data model, the settings sections that
//! the configuration loader fills in, observability helpers, and the shared
//! error taxonomy. Every other crate in the workspace depends on it, so it
//! stays free of browser and HTTP dependencies.
//!
//! # Overview
//!
//! - [`model`]: field rules, extraction results, feed items, transcript
//!   segments, and alert results
//! - [`settings`]: typed settings for the browser, timeouts, feed parsing,
//!   transcript selectors, alert selectors, rule sets, and the summarizer
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`GleanerError`] and [`Result`]: job-level error handling
//!
//! # Examples
//!
//! Resolving the rules for a target:
//!
//! ```rust
//! use gleaner_common::settings::RuleSet;
//!
//! let rules = RuleSet::default();
//! let plain = rules.rules_for("https://example.com/post").unwrap();
//! let video = rules.rules_for("https://www.youtube.com/watch?v=abc").unwrap();
//! assert!(video.len() > plain.len());
//! ```
pub mod model;
pub mod observability;
pub mod settings;

pub use model::{
    AlertResult, ExtractionResult, FeedItem, FieldDiagnostic, FieldFailure, FieldRule,
    TranscriptSegment,
};

/// Job-level failures.
///
/// Field-level problems never show up here; they are recorded as
/// [`FieldDiagnostic`]s on the [`ExtractionResult`] instead.
#[derive(thiserror::Error, Debug)]
pub enum GleanerError {
    /// The target could not be loaded. Fatal for the whole job.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// No feed root tag was present in the page text.
    #[error("feed root marker not found (looked for {markers:?})")]
    FeedMarkerNotFound { markers: Vec<String> },

    /// The feed root was found but the markup could not be parsed.
    #[error("feed parse error: {0}")]
    FeedParse(String),

    /// The search form could not be driven to a result state.
    #[error("search interaction failed: {0}")]
    SearchInteraction(String),

    /// The caller supplied a target that cannot be extracted.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A browser session could not be created or driven.
    #[error("browser session error: {0}")]
    Session(String),

    /// The whole job ran past its deadline.
    #[error("job exceeded its {0} ms deadline")]
    JobTimeout(u64),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The downstream summarizer reported a failure.
    #[error("summarizer error: {0}")]
    Summarizer(String),
}

/// Convenient alias for results that use [`GleanerError`].
pub type Result<T> = std::result::Result<T, GleanerError>;
