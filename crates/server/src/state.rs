use std::sync::Arc;

use tokio::sync::RwLock;

use recipe_core::schema::DataSchema;

use crate::auth::api_keys::ApiKeyStore;
use crate::auth::identity::IdentityVerifier;
use crate::graphql::{self, RecipeSchema};
use crate::handler::HandlerRegistry;

pub struct AppState {
    pub schema: Arc<DataSchema>,
    pub graphql: RecipeSchema,
    pub api_keys: RwLock<ApiKeyStore>,
    pub identity: Option<Arc<dyn IdentityVerifier>>,
}

impl AppState {
    pub fn new(
        schema: DataSchema,
        handlers: HandlerRegistry,
        api_keys: ApiKeyStore,
        identity: Option<Arc<dyn IdentityVerifier>>,
    ) -> Self {
        let schema = Arc::new(schema);
        let graphql = graphql::build_schema(schema.clone(), Arc::new(handlers));
        Self {
            schema,
            graphql,
            api_keys: RwLock::new(api_keys),
            identity,
        }
    }
}
