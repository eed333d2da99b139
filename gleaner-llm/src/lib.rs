//! Summarizer contract for extracted text.
//!
//! Extraction hands finished text to an [`traits::LlmClient`] and treats it
//! as opaque: whatever the backend reports is passed through as
//! [`gleaner_common::GleanerError::Summarizer`].
//!
//! # Examples
//! ```no_run
//! use gleaner_common::{settings::LlmSettings, Result};
//! use gleaner_llm::ensure_llm_ready;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let settings = LlmSettings::Ollama {
//!     model: "llama3.2:3b".into(),
//!     endpoint: "http://localhost:11434".into(),
//!     pull_missing: true,
//!     request_timeout_secs: 120,
//! };
//! let client = ensure_llm_ready(&settings).await?;
//! let summary = client
//!     .summarize_relevant("Price: 101.2\nSummary: ...", "What moved ACME today?")
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
pub mod ollama;
pub mod traits;

use gleaner_common::settings::LlmSettings;
use gleaner_common::GleanerError;
use ollama::{OllamaClient, OllamaOptions};
use std::sync::Arc;
use std::time::Duration;
use traits::LlmClient;

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";

/// Build the configured client. The server must be reachable; a missing
/// model is pulled only when the settings allow it.
pub async fn ensure_llm_ready(
    settings: &LlmSettings,
) -> gleaner_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match settings {
        LlmSettings::Ollama {
            model,
            endpoint,
            pull_missing,
            request_timeout_secs,
        } => {
            let model = match model.trim() {
                "" => DEFAULT_OLLAMA_MODEL.to_string(),
                named => named.to_string(),
            };
            let client = OllamaClient::connect(OllamaOptions {
                endpoint: endpoint.clone(),
                model,
                pull_missing: *pull_missing,
                request_timeout: Duration::from_secs(*request_timeout_secs),
            })
            .await?;
            Ok(Arc::new(client))
        }
        LlmSettings::None => Err(GleanerError::Config(
            "no summarizer configured (set llm.provider)".to_string(),
        )),
    }
}
