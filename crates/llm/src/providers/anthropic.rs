use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{LlmError, LlmProvider, Message};

use super::messages::{messages_body, reply_text};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Direct Anthropic Messages API, for running without AWS credentials.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_url(api_key, model, ANTHROPIC_MESSAGES_URL.to_string())
    }

    pub fn with_url(api_key: String, model: String, url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            url,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut body = messages_body(&messages, temperature, max_tokens);
        body["model"] = json!(self.model);

        debug!("Anthropic request to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        reply_text(&resp)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
