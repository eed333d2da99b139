use std::time::Duration;

/// Failures reported by the browser layer.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    /// A wait ran out before the selector appeared.
    #[error("`{selector}` did not appear within {} ms", .waited.as_millis())]
    Timeout { selector: String, waited: Duration },

    /// The selector matched nothing.
    #[error("no element matches `{0}`")]
    NotFound(String),

    /// A WebDriver command failed.
    #[error("webdriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),

    /// The WebDriver endpoint refused to start a session.
    #[error("could not start a browser session: {0}")]
    NewSession(#[from] fantoccini::error::NewSessionError),

    /// Anything else the browser reported, already rendered as text.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}
