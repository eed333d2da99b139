//! Driver layer for browser automation.
//!
//! Extractors never talk to WebDriver directly: they are generic over the
//! [`Page`] and [`PageElement`] traits, and every job gets its page through
//! [`session::with_session`], which owns the browser for exactly one job.
//!
//! - [`browser::driver::WebDriverLauncher`]: opens isolated `fantoccini` sessions
//! - [`browser::page::GleanerPage`]: WebDriver-backed [`Page`]
//! - [`browser::behavioral::BehavioralEngine`]: human-like pauses and typing
//! - [`browser::stealth`]: launch arguments and page-load evasions
//! - [`fake`]: scripted in-memory page (feature `fake`)
pub mod browser;
pub mod error;
pub mod session;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use browser::page::{Page, PageElement};
pub use error::DriverError;
pub use session::{with_session, BrowserSession, Launcher};
