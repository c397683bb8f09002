//! Amazon Bedrock provider (Anthropic Claude models via `InvokeModel`).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use serde_json::json;
use tracing::{debug, error, info};

use crate::provider::{LlmError, LlmProvider, Message};

use super::messages::{messages_body, reply_text, BEDROCK_ANTHROPIC_VERSION};

pub struct BedrockProvider {
    client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockProvider {
    pub fn new(client: aws_sdk_bedrockruntime::Client, model_id: String) -> Self {
        Self { client, model_id }
    }

    /// Load AWS credentials from the default chain for `region`.
    pub async fn from_region(region: &str, model_id: String) -> Self {
        let region_cfg = aws_sdk_bedrockruntime::config::Region::new(region.to_string());
        let aws_cfg = aws_config::defaults(BehaviorVersion::latest())
            .region(region_cfg)
            .load()
            .await;

        info!(region = %region, model = %model_id, "BedrockProvider initialised");

        Self::new(aws_sdk_bedrockruntime::Client::new(&aws_cfg), model_id)
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let mut body = messages_body(&messages, temperature, max_tokens);
        body["anthropic_version"] = json!(BEDROCK_ANTHROPIC_VERSION);

        let payload = serde_json::to_vec(&body).map_err(|e| LlmError::ParseError(e.to_string()))?;

        debug!(model = %self.model_id, bytes = payload.len(), "Bedrock invoke_model");

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                error!("Bedrock invoke_model failed: {}", detail);
                LlmError::Aws(detail)
            })?;

        let resp: serde_json::Value = serde_json::from_slice(response.body().as_ref())
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        reply_text(&resp)
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}
