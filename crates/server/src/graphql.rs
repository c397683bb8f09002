//! GraphQL surface: the executable schema built from the [`DataSchema`]
//! descriptor, plus the axum handlers serving it.

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Schema, SimpleObject,
};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use recipe_core::schema::{AskBedrockArgs, BedrockResponse, DataSchema, ASK_BEDROCK_QUERY};

use crate::auth::{self, AuthError, Caller, OperationGuard};
use crate::handler::HandlerRegistry;
use crate::state::AppState;

pub type RecipeSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// GraphQL view of the `BedrockResponse` custom type.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "BedrockResponse")]
pub struct BedrockResponseObject {
    pub body: Option<String>,
    pub error: Option<String>,
}

impl From<BedrockResponse> for BedrockResponseObject {
    fn from(r: BedrockResponse) -> Self {
        Self {
            body: r.body,
            error: r.error,
        }
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Ask the model for a recipe idea built from `ingredients`.
    #[graphql(guard = "OperationGuard::new(ASK_BEDROCK_QUERY)")]
    async fn ask_bedrock(
        &self,
        ctx: &Context<'_>,
        ingredients: Option<Vec<Option<String>>>,
    ) -> async_graphql::Result<Option<BedrockResponseObject>> {
        let schema = ctx.data::<Arc<DataSchema>>()?;
        let registry = ctx.data::<Arc<HandlerRegistry>>()?;

        let op = schema
            .query(ASK_BEDROCK_QUERY)
            .ok_or_else(|| async_graphql::Error::new("askBedrock is not declared"))?;
        let handler = registry.get(&op.handler.data_source).ok_or_else(|| {
            async_graphql::Error::new(format!("no handler bound to {}", op.handler.data_source))
        })?;

        let args: AskBedrockArgs = op
            .parse_arguments(&json!({ "ingredients": ingredients }))
            .map_err(|e| {
                async_graphql::Error::new(e.to_string())
                    .extend_with(|_, ext| ext.set("code", "BadRequest"))
            })?;
        let ingredients = args.ingredients();
        let subject = ctx
            .data_opt::<Caller>()
            .and_then(|c| c.identity.as_ref())
            .map(|i| i.subject.as_str())
            .unwrap_or("-");
        info!(
            operation = %op.name,
            data_source = %op.handler.data_source,
            subject = %subject,
            ingredients = ingredients.len(),
            "Dispatching query"
        );

        let outcome = handler.handle(&ingredients).await;
        if let Err(e) = &outcome {
            warn!(operation = %op.name, "Handler failed: {}", e);
        }

        Ok(Some(BedrockResponse::from_outcome(outcome).into()))
    }
}

/// Build the executable schema with the descriptor and handlers as context data.
pub fn build_schema(descriptor: Arc<DataSchema>, handlers: Arc<HandlerRegistry>) -> RecipeSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(descriptor)
        .data(handlers)
        .finish()
}

/// POST /graphql
pub async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> Result<GraphQLResponse, AuthError> {
    let caller = auth::resolve_caller(
        &headers,
        &state.api_keys,
        state.identity.as_deref(),
        Utc::now(),
    )
    .await?;

    let request = req.into_inner().data(caller);
    Ok(state.graphql.execute(request).await.into())
}

/// GET /graphql
pub async fn graphiql() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .title("Recipe API")
            .finish(),
    )
}

/// GET /schema.graphql: the declared schema, auth rules included.
pub async fn sdl(State(state): State<Arc<AppState>>) -> String {
    state.schema.to_sdl()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use recipe_core::schema::BEDROCK_DATA_SOURCE;

    use super::*;
    use crate::auth::identity::Identity;
    use crate::handler::{HandlerError, HandlerOutcome, QueryHandler};

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl QueryHandler for CountingHandler {
        async fn handle(&self, ingredients: &[String]) -> HandlerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(ingredients.to_vec());
            if self.fail {
                return Err(HandlerError::Reply("model unavailable".into()));
            }
            Ok(format!("recipe with {}", ingredients.join("+")))
        }

        fn kind(&self) -> &'static str {
            "counting"
        }
    }

    fn schema_with(handler: Arc<CountingHandler>) -> RecipeSchema {
        let mut registry = HandlerRegistry::new();
        registry.register(BEDROCK_DATA_SOURCE, handler);
        build_schema(Arc::new(DataSchema::recipe()), Arc::new(registry))
    }

    fn user() -> Caller {
        Caller {
            api_key_id: None,
            identity: Some(Identity {
                subject: "chef".into(),
                issuer: None,
                expires_at: i64::MAX,
            }),
        }
    }

    fn key_holder() -> Caller {
        Caller {
            api_key_id: Some("key-1".into()),
            identity: None,
        }
    }

    async fn run(
        schema: &RecipeSchema,
        query: &str,
        caller: Option<Caller>,
    ) -> async_graphql::Response {
        let mut request = async_graphql::Request::new(query);
        if let Some(caller) = caller {
            request = request.data(caller);
        }
        schema.execute(request).await
    }

    #[tokio::test]
    async fn authenticated_caller_gets_body() {
        let handler = Arc::new(CountingHandler::default());
        let schema = schema_with(handler.clone());

        let resp = run(
            &schema,
            r#"{ askBedrock(ingredients: ["flour", "sugar", "eggs"]) { body error } }"#,
            Some(user()),
        )
        .await;

        assert!(resp.errors.is_empty(), "{:?}", resp.errors);
        let data = resp.data.into_json().unwrap();
        assert_eq!(data["askBedrock"]["body"], "recipe with flour+sugar+eggs");
        assert!(data["askBedrock"]["error"].is_null());
        assert_eq!(handler.seen.lock().unwrap()[0], vec!["flour", "sugar", "eggs"]);
    }

    #[tokio::test]
    async fn any_list_length_is_accepted() {
        let handler = Arc::new(CountingHandler::default());
        let schema = schema_with(handler.clone());

        for query in [
            r#"{ askBedrock { body } }"#,
            r#"{ askBedrock(ingredients: null) { body } }"#,
            r#"{ askBedrock(ingredients: []) { body } }"#,
            r#"{ askBedrock(ingredients: ["salt"]) { body } }"#,
        ] {
            let resp = run(&schema, query, Some(user())).await;
            assert!(resp.errors.is_empty(), "{query}: {:?}", resp.errors);
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
        assert!(handler.seen.lock().unwrap()[0].is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_callers_never_reach_the_handler() {
        let handler = Arc::new(CountingHandler::default());
        let schema = schema_with(handler.clone());
        let query = r#"{ askBedrock(ingredients: ["flour"]) { body error } }"#;

        for caller in [None, Some(Caller::default()), Some(key_holder())] {
            let resp = run(&schema, query, caller).await;
            assert_eq!(resp.errors.len(), 1);
            assert_eq!(
                resp.errors[0].message,
                "Not Authorized to access askBedrock on type Query"
            );
            let code = resp.errors[0]
                .extensions
                .as_ref()
                .and_then(|ext| ext.get("code"))
                .cloned();
            assert_eq!(code, Some(async_graphql::Value::from("Unauthorized")));
            let data = resp.data.into_json().unwrap();
            assert!(data["askBedrock"].is_null());
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_surfaces_in_error_field() {
        let handler = Arc::new(CountingHandler {
            fail: true,
            ..Default::default()
        });
        let schema = schema_with(handler);

        let resp = run(&schema, r#"{ askBedrock(ingredients: ["kale"]) { body error } }"#, Some(user())).await;
        assert!(resp.errors.is_empty());
        let data = resp.data.into_json().unwrap();
        assert!(data["askBedrock"]["body"].is_null());
        assert_eq!(data["askBedrock"]["error"], "model unavailable");
    }

    #[tokio::test]
    async fn wrong_argument_shape_is_a_validation_error() {
        let handler = Arc::new(CountingHandler::default());
        let schema = schema_with(handler.clone());

        let resp = run(&schema, r#"{ askBedrock(ingredients: [1, 2]) { body } }"#, Some(user())).await;
        assert!(!resp.errors.is_empty());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_response_fields_are_rejected() {
        let schema = schema_with(Arc::new(CountingHandler::default()));
        let resp = run(&schema, r#"{ askBedrock { body statusCode } }"#, Some(user())).await;
        assert!(!resp.errors.is_empty());
    }

    #[tokio::test]
    async fn nullable_list_variable_is_accepted() {
        let handler = Arc::new(CountingHandler::default());
        let schema = schema_with(handler.clone());

        let request = async_graphql::Request::new(
            "query Ask($ingredients: [String]) { askBedrock(ingredients: $ingredients) { body error } }",
        )
        .variables(async_graphql::Variables::from_json(serde_json::json!({
            "ingredients": ["rice", null, "egg"]
        })))
        .data(user());
        let resp = schema.execute(request).await;

        assert!(resp.errors.is_empty(), "{:?}", resp.errors);
        let data = resp.data.into_json().unwrap();
        assert_eq!(data["askBedrock"]["body"], "recipe with rice+egg");
        assert_eq!(handler.seen.lock().unwrap()[0], vec!["rice", "egg"]);
    }

    #[test]
    fn sdl_matches_descriptor() {
        let sdl = schema_with(Arc::new(CountingHandler::default())).sdl();
        assert!(sdl.contains("askBedrock(ingredients: [String]): BedrockResponse"));
        assert!(sdl.contains("type BedrockResponse"));
        assert!(sdl.contains("body: String"));
        assert!(sdl.contains("error: String"));
    }
}
