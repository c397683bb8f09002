pub mod bedrock;
pub mod anthropic;
pub mod messages;

use recipe_core::config::LlmConfig;

use crate::provider::{LlmError, LlmProvider};

/// Create the appropriate LLM provider based on config.
pub async fn create_provider(llm_config: &LlmConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    match llm_config.provider.as_str() {
        "bedrock" => Ok(Box::new(
            bedrock::BedrockProvider::from_region(
                &llm_config.bedrock_region,
                llm_config.bedrock_model_id.clone(),
            )
            .await,
        )),
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                api_key.clone(),
                llm_config.anthropic_model.clone(),
            )))
        }
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
