use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub handler: HandlerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RECIPE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RECIPE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            auth: AuthConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            handler: HandlerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.auth.validate()?;
        self.handler.validate()?;
        // An external handler never builds a provider.
        if self.handler.kind != "http" {
            self.llm.validate()?;
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:  data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  auth:     api_key_expiry={}d, identity={}",
            self.auth.api_key_expires_in_days,
            if self.auth.jwt_secret.is_some() { "configured" } else { "(none)" }
        );
        tracing::info!("  llm:      provider={}, model={}", self.llm.provider, self.llm.model_label());
        tracing::info!("  handler:  kind={}", self.handler.kind);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }
}

// ── Auth ──────────────────────────────────────────────────────

/// AppSync accepts API key lifetimes between one day and one year.
pub const API_KEY_MIN_DAYS: u32 = 1;
pub const API_KEY_MAX_DAYS: u32 = 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_key_expires_in_days: u32,
    /// HS256 secret for identity tokens. Without it no caller can be authenticated.
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
}

impl AuthConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_key_expires_in_days: profiled_env_u32(p, "API_KEY_EXPIRES_IN_DAYS", 30),
            jwt_secret: profiled_env_opt(p, "AUTH_JWT_SECRET"),
            jwt_issuer: profiled_env_opt(p, "AUTH_JWT_ISSUER"),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(API_KEY_MIN_DAYS..=API_KEY_MAX_DAYS).contains(&self.api_key_expires_in_days) {
            return Err(CoreError::Config(format!(
                "API_KEY_EXPIRES_IN_DAYS must be between {} and {}, got {}",
                API_KEY_MIN_DAYS, API_KEY_MAX_DAYS, self.api_key_expires_in_days
            )));
        }
        Ok(())
    }
}

// ── LLM (Bedrock / Anthropic) ────────────────────────────────

pub const DEFAULT_BEDROCK_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "bedrock", "anthropic"
    pub provider: String,
    pub bedrock_region: String,
    pub bedrock_model_id: String,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        let bedrock_region = profiled_env_opt(p, "BEDROCK_REGION")
            .or_else(|| profiled_env_opt(p, "AWS_REGION"))
            .unwrap_or_else(|| "us-east-1".to_string());
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "bedrock"),
            bedrock_region,
            bedrock_model_id: profiled_env_or(p, "BEDROCK_MODEL_ID", DEFAULT_BEDROCK_MODEL_ID),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-3-sonnet-20240229"),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "1.0")
                .parse()
                .unwrap_or(1.0),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 1000),
        }
    }

    pub fn model_label(&self) -> &str {
        match self.provider.as_str() {
            "anthropic" | "claude" => &self.anthropic_model,
            _ => &self.bedrock_model_id,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self.provider.as_str() {
            "bedrock" => Ok(()),
            "anthropic" | "claude" if self.anthropic_api_key.is_some() => Ok(()),
            "anthropic" | "claude" => Err(CoreError::Config("ANTHROPIC_API_KEY not set".into())),
            other => Err(CoreError::Config(format!("unknown LLM provider: '{}'", other))),
        }
    }
}

// ── Handler binding ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// "bedrock" (in-process) or "http" (external function).
    pub kind: String,
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl HandlerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            kind: profiled_env_or(p, "HANDLER_KIND", "bedrock"),
            url: profiled_env_opt(p, "HANDLER_URL"),
            timeout_secs: profiled_env_u64(p, "HANDLER_TIMEOUT_SECS", 30),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match (self.kind.as_str(), &self.url) {
            ("bedrock", _) | ("http", Some(_)) => Ok(()),
            ("http", None) => Err(CoreError::Config("HANDLER_URL is required when HANDLER_KIND=http".into())),
            (other, _) => Err(CoreError::Config(format!("unknown handler kind: '{}'", other))),
        }
    }
}
