//! Handler binding: data-source name → implementation of an operation.
//!
//! Handlers return a tagged [`HandlerOutcome`]; the GraphQL layer renders it
//! as a `BedrockResponse` with exactly one field populated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use recipe_core::config::Config;
use recipe_core::schema::{
    BedrockResponse, CustomType, DataSchema, SchemaError, BEDROCK_DATA_SOURCE,
    BEDROCK_RESPONSE_TYPE,
};
use recipe_llm::{LlmError, RecipeGenerator};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("handler request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("handler returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("handler reply violates the response contract: {0}")]
    Contract(#[from] SchemaError),

    #[error("{0}")]
    Reply(String),
}

pub type HandlerOutcome = Result<String, HandlerError>;

#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, ingredients: &[String]) -> HandlerOutcome;

    fn kind(&self) -> &'static str;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, data_source: impl Into<String>, handler: Arc<dyn QueryHandler>) {
        let data_source = data_source.into();
        info!(data_source = %data_source, kind = handler.kind(), "Registered handler");
        self.handlers.insert(data_source, handler);
    }

    pub fn get(&self, data_source: &str) -> Option<Arc<dyn QueryHandler>> {
        self.handlers.get(data_source).cloned()
    }

    /// Every data source the schema binds must have a handler.
    pub fn ensure_bound(&self, schema: &DataSchema) -> anyhow::Result<()> {
        for data_source in schema.data_sources() {
            if !self.handlers.contains_key(data_source) {
                anyhow::bail!(
                    "data source '{}' is bound in the schema but no handler is registered",
                    data_source
                );
            }
        }
        Ok(())
    }

    /// Build the registry the config asks for.
    pub async fn from_config(config: &Config, schema: &DataSchema) -> anyhow::Result<Self> {
        let handler: Arc<dyn QueryHandler> = match config.handler.kind.as_str() {
            "http" => {
                let url = config
                    .handler
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("HANDLER_URL is required when HANDLER_KIND=http"))?;
                Arc::new(HttpHandler::new(
                    url,
                    Duration::from_secs(config.handler.timeout_secs),
                    schema,
                )?)
            }
            _ => {
                let generator = RecipeGenerator::from_config(&config.llm).await?;
                Arc::new(BedrockHandler::new(generator))
            }
        };

        let mut registry = Self::new();
        registry.register(BEDROCK_DATA_SOURCE, handler);
        registry.ensure_bound(schema)?;
        Ok(registry)
    }
}

// ── In-process Bedrock handler ────────────────────────────────

pub struct BedrockHandler {
    generator: RecipeGenerator,
}

impl BedrockHandler {
    pub fn new(generator: RecipeGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl QueryHandler for BedrockHandler {
    async fn handle(&self, ingredients: &[String]) -> HandlerOutcome {
        Ok(self.generator.suggest(ingredients).await?)
    }

    fn kind(&self) -> &'static str {
        "bedrock"
    }
}

// ── External function over HTTP ───────────────────────────────

/// Forwards the ingredients to an external function and checks its reply
/// against the declared response type.
pub struct HttpHandler {
    client: reqwest::Client,
    url: String,
    response_type: CustomType,
}

impl HttpHandler {
    pub fn new(url: String, timeout: Duration, schema: &DataSchema) -> anyhow::Result<Self> {
        let response_type = schema
            .custom_type(BEDROCK_RESPONSE_TYPE)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("schema does not declare {}", BEDROCK_RESPONSE_TYPE))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            response_type,
        })
    }
}

#[async_trait]
impl QueryHandler for HttpHandler {
    async fn handle(&self, ingredients: &[String]) -> HandlerOutcome {
        debug!("Forwarding {} ingredients to {}", ingredients.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "ingredients": ingredients }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::Status { status, body });
        }

        let reply: serde_json::Value = response.json().await?;
        self.response_type.validate(&reply)?;

        let reply: BedrockResponse = serde_json::from_value(reply)
            .map_err(|e| HandlerError::Reply(format!("unreadable reply: {e}")))?;
        if !reply.is_well_formed() {
            warn!(url = %self.url, "Handler reply should populate exactly one of body/error");
        }
        reply.into_outcome().map_err(HandlerError::Reply)
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}
