use async_trait::async_trait;
use gleaner_common::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

const SUMMARIZER_SYSTEM_PROMPT: &str = r#"You summarize web content for a reader who asked a specific question.

Guidelines:
- Keep only what bears on the reader's message
- Quote figures, dates, and names exactly as they appear in the content
- Say so plainly when the content has nothing relevant
- Do not add facts that are not in the content"#;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Check if the LLM service is available
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Summarize `candidate` with respect to `reference`, e.g. extracted page
    /// text against the question that prompted the extraction.
    async fn summarize_relevant(&self, candidate: &str, reference: &str) -> Result<String> {
        let prompt = format!(
            "READER MESSAGE: \"{reference}\"\n\nCONTENT:\n{candidate}\n\nRelevant summary:"
        );
        tracing::debug!(
            target: "gleaner.summarizer",
            model = self.model_name(),
            candidate_chars = candidate.len(),
            "requesting summary"
        );
        let response = self
            .generate(&prompt, Some(SUMMARIZER_SYSTEM_PROMPT), Some(400), Some(0.2))
            .await?;
        Ok(response.text.trim().to_string())
    }
}
