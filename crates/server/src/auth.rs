//! Request authorization.
//!
//! Credentials are resolved once per HTTP request into a [`Caller`]; bad or
//! missing credentials are rejected with 401 before GraphQL runs. Each
//! operation then carries an [`OperationGuard`] that checks the caller
//! against the rule the [`DataSchema`] declares for it, before the resolver
//! (and therefore the handler) is invoked.

pub mod api_keys;
pub mod identity;


use std::sync::Arc;

use async_graphql::{Context, ErrorExtensions, Guard};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use recipe_core::schema::{AuthRule, DataSchema};

use self::api_keys::{ApiKeyError, ApiKeyStore};
use self::identity::{Identity, IdentityError, IdentityVerifier};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization: send an x-api-key header or a bearer token")]
    MissingCredentials,

    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "errors": [{
                "errorType": "UnauthorizedException",
                "message": self.to_string(),
            }]
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Credentials a request presented, already verified.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub api_key_id: Option<String>,
    pub identity: Option<Identity>,
}

impl Caller {
    /// Each rule is satisfied only by its own mode.
    pub fn satisfies(&self, rule: AuthRule) -> bool {
        match rule {
            AuthRule::ApiKey => self.api_key_id.is_some(),
            AuthRule::Authenticated => self.identity.is_some(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => raw,
    };
    (!token.is_empty()).then_some(token)
}

async fn check_api_key(
    keys: &RwLock<ApiKeyStore>,
    key: &str,
    now: DateTime<Utc>,
) -> Result<String, ApiKeyError> {
    // The CLI issues and revokes keys on disk; pick those up before checking.
    let stale = keys.read().await.is_stale().unwrap_or_else(|e| {
        warn!("Failed to stat API key store: {}", e);
        false
    });
    if stale {
        let mut store = keys.write().await;
        if let Err(e) = store.refresh() {
            warn!("Failed to reload API key store: {}", e);
        }
    }

    let store = keys.read().await;
    store.validate_at(key, now).map(|r| r.id.clone())
}

/// Verify whatever credentials the request carries.
pub async fn resolve_caller(
    headers: &HeaderMap,
    keys: &RwLock<ApiKeyStore>,
    identity: Option<&dyn IdentityVerifier>,
    now: DateTime<Utc>,
) -> Result<Caller, AuthError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty());
    let token = bearer_token(headers);

    if api_key.is_none() && token.is_none() {
        return Err(AuthError::MissingCredentials);
    }

    let mut caller = Caller::default();

    if let Some(key) = api_key {
        let id = check_api_key(keys, key, now).await.map_err(|e| {
            warn!("Rejected API key: {}", e);
            e
        })?;
        caller.api_key_id = Some(id);
    }

    if let Some(token) = token {
        let verifier = identity.ok_or(IdentityError::NotConfigured)?;
        let verified = verifier.verify(token).map_err(|e| {
            warn!("Rejected identity token: {}", e);
            e
        })?;
        caller.identity = Some(verified);
    }

    Ok(caller)
}

/// Enforces the declared authorization rule of one query.
pub struct OperationGuard {
    operation: &'static str,
}

impl OperationGuard {
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl Guard for OperationGuard {
    async fn check(&self, ctx: &Context<'_>) -> async_graphql::Result<()> {
        let schema = ctx.data::<Arc<DataSchema>>()?;
        let op = schema
            .query(self.operation)
            .ok_or_else(|| async_graphql::Error::new(format!("operation {} is not declared", self.operation)))?;
        let rule = schema.rule_for(op);

        let allowed = ctx
            .data_opt::<Caller>()
            .map(|caller| caller.satisfies(rule))
            .unwrap_or(false);

        if allowed {
            return Ok(());
        }

        warn!(operation = %op.name, rule = %rule, "Caller not authorized");
        Err(
            async_graphql::Error::new(format!("Not Authorized to access {} on type Query", op.name))
                .extend_with(|_, e| e.set("code", "Unauthorized")),
        )
    }
}
