//! Server startup: shared state initialization.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use recipe_core::schema::DataSchema;
use recipe_core::Config;

use crate::auth::api_keys::{ApiKeyError, ApiKeyStore, IssuedKey};
use crate::auth::identity::{IdentityVerifier, JwtVerifier};
use crate::handler::HandlerRegistry;
use crate::state::AppState;

/// Open the API key store under the configured data dir.
pub fn open_key_store(config: &Config) -> anyhow::Result<ApiKeyStore> {
    ApiKeyStore::open(&config.storage.data_dir, config.auth.api_key_expires_in_days).with_context(|| {
        format!(
            "failed to open API key store in {}",
            config.storage.data_dir.display()
        )
    })
}

/// API key is the default mode; issue one when none is active. The caller
/// shows the returned plaintext to the operator.
pub fn ensure_active_key(
    store: &mut ApiKeyStore,
    now: DateTime<Utc>,
) -> Result<Option<IssuedKey>, ApiKeyError> {
    if store.has_active_at(now) {
        return Ok(None);
    }
    let issued = store.issue_at(Some("default".into()), now)?;
    info!(
        id = %issued.record.id,
        expires_at = %issued.record.expires_at,
        "No active API key, issued one"
    );
    Ok(Some(issued))
}

/// Build `AppState` from config: schema, keys, identity verifier, handlers.
pub async fn build_app_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    config.validate()?;

    let schema = DataSchema::recipe().with_api_key_expiry(config.auth.api_key_expires_in_days);

    let mut api_keys = open_key_store(config)?;
    if let Some(issued) = ensure_active_key(&mut api_keys, Utc::now())? {
        // Plaintext goes to stdout once, never to the log.
        println!("api key: {}", issued.key);
    }
    info!("API key store ready ({} keys)", api_keys.list().len());

    let identity: Option<Arc<dyn IdentityVerifier>> = match &config.auth.jwt_secret {
        Some(secret) => Some(Arc::new(JwtVerifier::new(
            secret,
            config.auth.jwt_issuer.as_deref(),
        ))),
        None => {
            warn!("AUTH_JWT_SECRET not set; no caller can satisfy 'authenticated' rules");
            None
        }
    };

    let handlers = HandlerRegistry::from_config(config, &schema)
        .await
        .context("failed to initialize query handlers")?;

    Ok(Arc::new(AppState::new(schema, handlers, api_keys, identity)))
}
