/// Completion provider integration.
///
/// The access controller depends only on the [`Generator`] trait; the
/// production implementation talks to an OpenAI-compatible chat-completions
/// endpoint over HTTP.

pub mod prompts;

use crate::config::LlmConfig;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Text generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    /// Submit a system/user prompt pair and return the completion text,
    /// failing with a generation error on provider failure.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> ApiResult<String>;
}

/// OpenAI-compatible chat completions client (non-streaming)
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> ApiResult<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Generation(format!("Provider request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::Generation(format!(
                "Provider returned {}: {}",
                status, detail
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Generation(format!("Invalid provider response: {}", e)))?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ApiError::Generation("Provider response missing completion text".to_string())
            })?;

        Ok(text.trim().to_string())
    }
}
