use tracing::{debug, info};

use crate::provider::{LlmError, LlmProvider, Message};

/// Placeholder in the prompt template replaced with the ingredient list.
const INGREDIENTS_PLACEHOLDER: &str = "<<<ingredients>>>";

const RECIPE_PROMPT_TEMPLATE: &str =
    "Suggest a recipe idea using these ingredients: <<<ingredients>>>.";

const PANTRY_PROMPT: &str = "Suggest a recipe idea using common pantry ingredients.";

/// Turns an ingredient list into a recipe suggestion via an LLM.
pub struct RecipeGenerator {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl RecipeGenerator {
    pub fn new(provider: Box<dyn LlmProvider>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }

    /// Build from config, creating the appropriate provider.
    pub async fn from_config(llm_config: &recipe_core::config::LlmConfig) -> Result<Self, LlmError> {
        let provider = crate::providers::create_provider(llm_config).await?;
        Ok(Self::new(provider, llm_config.temperature, llm_config.max_tokens))
    }

    /// Prompt for the given ingredients, in the order given. Blank entries are skipped.
    pub fn prompt(ingredients: &[String]) -> String {
        let listed: Vec<&str> = ingredients
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .collect();

        if listed.is_empty() {
            return PANTRY_PROMPT.to_string();
        }
        RECIPE_PROMPT_TEMPLATE.replace(INGREDIENTS_PLACEHOLDER, &listed.join(", "))
    }

    pub async fn suggest(&self, ingredients: &[String]) -> Result<String, LlmError> {
        let prompt = Self::prompt(ingredients);

        info!(
            provider = self.provider.name(),
            ingredients = ingredients.len(),
            "Requesting recipe suggestion"
        );

        let response = self
            .provider
            .complete(vec![Message::user(prompt)], self.temperature, self.max_tokens)
            .await?;

        debug!("LLM response: {}", response);
        Ok(response)
    }
}
