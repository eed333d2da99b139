//! Local summarization through an Ollama server (<https://github.com/ollama/ollama>).
use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use gleaner_common::{GleanerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const NOT_RUNNING: &str =
    "no Ollama server answered; start one with `ollama serve` or point llm.endpoint at it";

/// How to reach the server and which model to use.
#[derive(Debug, Clone)]
pub struct OllamaOptions {
    pub endpoint: String,
    pub model: String,
    /// Pull `model` when the server does not list it.
    pub pull_missing: bool,
    /// Upper bound for one generate or pull request.
    pub request_timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize, Default)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Deserialize)]
struct LocalModel {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

/// [`LlmClient`] over Ollama's `/api/generate`.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Connect to the server and make sure the model is available, pulling it
    /// first when `options.pull_missing` is set.
    pub async fn connect(options: OllamaOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(options.request_timeout)
            .build()
            .map_err(summarizer_error("building HTTP client"))?;
        let client = Self {
            http,
            base_url: options.endpoint.trim_end_matches('/').to_string(),
            model: options.model,
        };

        let local = client.local_models().await?;
        if has_model(&local, &client.model) {
            debug!(target: "gleaner.summarizer", model = %client.model, "model available");
        } else if options.pull_missing {
            client.pull().await?;
        } else {
            return Err(GleanerError::Summarizer(format!(
                "model {} is not on the server; run `ollama pull {}` or enable llm.pull_missing",
                client.model, client.model
            )));
        }
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Names of the models the server has locally. Also serves as the
    /// liveness check.
    async fn local_models(&self) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(self.url("tags"))
            .send()
            .await
            .map_err(|_| GleanerError::Summarizer(NOT_RUNNING.to_string()))?;
        if !resp.status().is_success() {
            return Err(GleanerError::Summarizer(format!(
                "{NOT_RUNNING} (HTTP {})",
                resp.status()
            )));
        }
        let tags: TagsReply = resp
            .json()
            .await
            .map_err(summarizer_error("reading model list"))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull(&self) -> Result<()> {
        info!(target: "gleaner.summarizer", model = %self.model, "pulling model");
        let resp = self
            .http
            .post(self.url("pull"))
            .json(&PullRequest {
                model: &self.model,
                stream: false,
            })
            .send()
            .await
            .map_err(summarizer_error("pulling model"))?;
        if !resp.status().is_success() {
            return Err(GleanerError::Summarizer(format!(
                "pulling model {} failed: HTTP {}",
                self.model,
                resp.status()
            )));
        }
        info!(target: "gleaner.summarizer", model = %self.model, "model pulled");
        Ok(())
    }
}

/// `llama3.2` matches a server entry `llama3.2:latest`.
fn has_model(local: &[String], wanted: &str) -> bool {
    local.iter().any(|name| {
        name == wanted || (!wanted.contains(':') && name.strip_suffix(":latest") == Some(wanted))
    })
}

fn summarizer_error(context: &'static str) -> impl Fn(reqwest::Error) -> GleanerError {
    move |e| GleanerError::Summarizer(format!("{context}: {e}"))
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: SamplingOptions {
                temperature,
                num_predict: max_tokens,
            },
        };
        let resp = self
            .http
            .post(self.url("generate"))
            .json(&request)
            .send()
            .await
            .map_err(summarizer_error("generate request"))?;
        if !resp.status().is_success() {
            return Err(GleanerError::Summarizer(format!(
                "generate failed: HTTP {}",
                resp.status()
            )));
        }
        let reply: GenerateReply = resp
            .json()
            .await
            .map_err(summarizer_error("reading generate reply"))?;
        Ok(LlmResponse {
            text: reply.response,
            model: Some(self.model.clone()),
            tokens_used: reply.eval_count,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.local_models().await.is_ok())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_model_matches_latest() {
        let local = vec!["llama3.2:latest".to_string(), "qwen2.5:7b".to_string()];
        assert!(has_model(&local, "llama3.2"));
        assert!(has_model(&local, "qwen2.5:7b"));
        assert!(!has_model(&local, "qwen2.5"));
        assert!(!has_model(&local, "llama3.2:3b"));
    }

    #[test]
    fn unset_sampling_options_are_omitted() {
        let body = serde_json::to_value(GenerateRequest {
            model: "m",
            prompt: "p",
            system: None,
            stream: false,
            options: SamplingOptions::default(),
        })
        .unwrap();
        assert_eq!(body["options"], serde_json::json!({}));
        assert!(body.get("system").is_none());
    }
}
