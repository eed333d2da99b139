//! Extractors for one target per job.
//!
//! - [`engine`]: rule-table interpreter for generic pages, with per-field
//!   failure isolation
//! - [`feed`]: root-tag recovery, ampersand sanitization, and RSS/Atom parsing
//! - [`transcript`]: the click-through state machine for video transcripts
//! - [`alerts`]: search form submission and result list scraping
//! - [`job`]: target validation and dispatch inside a scoped browser session
//!
//! Extractors are generic over [`gleaner_drivers::Page`], so tests drive them
//! with the scripted page from `gleaner_drivers::fake`.

pub mod alerts;
pub mod engine;
pub mod feed;
pub mod job;
pub mod transcript;

pub use job::{ExtractionJob, Extractor, ExtractorSettings, JobKind, JobOutput, JobTarget};
