//! Schema & authorization descriptor for the recipe data API.
//!
//! [`DataSchema`] is a plain immutable value: the custom response type, the
//! `askBedrock` query signature, the default authorization mode and the
//! handler binding. It is built once at startup and shared by reference; the
//! server reads authorization rules and handler bindings from it.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const BEDROCK_RESPONSE_TYPE: &str = "BedrockResponse";
pub const ASK_BEDROCK_QUERY: &str = "askBedrock";
pub const BEDROCK_DATA_SOURCE: &str = "bedrockDS";
pub const DEFAULT_API_KEY_EXPIRY_DAYS: u32 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{type_name}: expected an object")]
    NotAnObject { type_name: String },

    #[error("{type_name}: unknown field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("{type_name}.{field}: expected {expected}")]
    WrongType {
        type_name: String,
        field: String,
        expected: &'static str,
    },

    #[error("{type_name}.{field}: required")]
    MissingField { type_name: String, field: String },

    #[error("{type_name}: {message}")]
    Decode { type_name: String, message: String },
}

// ── Field shapes ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Nullable string scalar.
    String,
    /// List of nullable strings.
    StringList,
}

impl FieldType {
    fn sdl(self) -> &'static str {
        match self {
            FieldType::String => "String",
            FieldType::StringList => "[String]",
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldType::String => "a string or null",
            FieldType::StringList => "a list of strings (elements may be null) or null",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::StringList, Value::Array(items)) => {
                items.iter().all(|v| v.is_string() || v.is_null())
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn optional(name: &str, ty: FieldType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            required: false,
        }
    }

    fn sdl(&self) -> String {
        let bang = if self.required { "!" } else { "" };
        format!("{}: {}{}", self.name, self.ty.sdl(), bang)
    }
}

/// Check an object against a list of field definitions.
fn validate_fields(type_name: &str, fields: &[FieldDef], value: &Value) -> Result<(), SchemaError> {
    let obj = value.as_object().ok_or_else(|| SchemaError::NotAnObject {
        type_name: type_name.to_string(),
    })?;

    for key in obj.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            return Err(SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field: key.clone(),
            });
        }
    }

    for field in fields {
        match obj.get(&field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(SchemaError::MissingField {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                });
            }
            Some(v) if !field.ty.accepts(v) => {
                return Err(SchemaError::WrongType {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    expected: field.ty.expected(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Custom types ──────────────────────────────────────────────

/// A named response shape defined for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomType {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl CustomType {
    /// Structural check of a handler reply against this shape.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        validate_fields(&self.name, &self.fields, value)
    }
}

// ── Authorization ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    ApiKey,
    Identity,
}

/// What a caller must present to run an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthRule {
    /// A valid, unexpired API key.
    ApiKey,
    /// A verified caller identity. API keys never satisfy this rule.
    Authenticated,
}

impl fmt::Display for AuthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRule::ApiKey => write!(f, "apiKey"),
            AuthRule::Authenticated => write!(f, "authenticated"),
        }
    }
}

impl AuthMode {
    pub fn default_rule(self) -> AuthRule {
        match self {
            AuthMode::ApiKey => AuthRule::ApiKey,
            AuthMode::Identity => AuthRule::Authenticated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyMode {
    pub expires_in_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationModes {
    pub default_mode: AuthMode,
    pub api_key: ApiKeyMode,
}

impl AuthorizationModes {
    /// The operation's own rule when it overrides, otherwise the default mode.
    pub fn rule_for(&self, op: &QueryOperation) -> AuthRule {
        op.authorization.unwrap_or_else(|| self.default_mode.default_rule())
    }
}

// ── Operations ────────────────────────────────────────────────

/// Route from an operation to the code that implements it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerBinding {
    pub entry: String,
    pub data_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOperation {
    pub name: String,
    pub arguments: Vec<FieldDef>,
    pub returns: String,
    /// Per-operation override of the default authorization mode.
    pub authorization: Option<AuthRule>,
    pub handler: HandlerBinding,
}

impl QueryOperation {
    /// Check argument shape, then decode. Cardinality and content are left
    /// to the handler.
    pub fn parse_arguments<T: DeserializeOwned>(&self, args: &Value) -> Result<T, SchemaError> {
        let type_name = format!("{}(args)", self.name);
        validate_fields(&type_name, &self.arguments, args)?;
        serde_json::from_value(args.clone()).map_err(|e| SchemaError::Decode {
            type_name,
            message: e.to_string(),
        })
    }

    fn sdl(&self) -> String {
        let args: Vec<String> = self.arguments.iter().map(FieldDef::sdl).collect();
        let directive = match self.authorization {
            Some(rule) => format!(" @auth(rule: \"{}\")", rule),
            None => String::new(),
        };
        format!("  {}({}): {}{}", self.name, args.join(", "), self.returns, directive)
    }
}

/// Arguments of `askBedrock`. An absent list means no ingredients; null
/// elements are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskBedrockArgs {
    #[serde(default)]
    pub ingredients: Option<Vec<Option<String>>>,
}

impl AskBedrockArgs {
    pub fn ingredients(&self) -> Vec<String> {
        self.ingredients
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect()
    }
}

// ── Response value ────────────────────────────────────────────

/// Wire value of the `BedrockResponse` custom type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockResponse {
    pub body: Option<String>,
    pub error: Option<String>,
}

impl BedrockResponse {
    pub fn from_outcome<E: fmt::Display>(outcome: Result<String, E>) -> Self {
        match outcome {
            Ok(body) => Self {
                body: Some(body),
                error: None,
            },
            Err(e) => Self {
                body: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Collapse the two loose fields into a tagged result.
    ///
    /// A populated `error` always wins, even when `body` is also set. An
    /// empty reply (neither field) is reported as an error.
    pub fn into_outcome(self) -> Result<String, String> {
        match (self.body, self.error) {
            (_, Some(error)) => Err(error),
            (Some(body), None) => Ok(body),
            (None, None) => Err("handler returned neither body nor error".to_string()),
        }
    }

    /// Exactly one of the two fields is populated.
    pub fn is_well_formed(&self) -> bool {
        self.body.is_some() != self.error.is_some()
    }
}

// ── Descriptor ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSchema {
    pub types: Vec<CustomType>,
    pub queries: Vec<QueryOperation>,
    pub authorization: AuthorizationModes,
}

impl DataSchema {
    /// The recipe API: one custom type, one query, API key by default.
    pub fn recipe() -> Self {
        Self {
            types: vec![CustomType {
                name: BEDROCK_RESPONSE_TYPE.to_string(),
                fields: vec![
                    FieldDef::optional("body", FieldType::String),
                    FieldDef::optional("error", FieldType::String),
                ],
            }],
            queries: vec![QueryOperation {
                name: ASK_BEDROCK_QUERY.to_string(),
                arguments: vec![FieldDef::optional("ingredients", FieldType::StringList)],
                returns: BEDROCK_RESPONSE_TYPE.to_string(),
                authorization: Some(AuthRule::Authenticated),
                handler: HandlerBinding {
                    entry: "bedrock".to_string(),
                    data_source: BEDROCK_DATA_SOURCE.to_string(),
                },
            }],
            authorization: AuthorizationModes {
                default_mode: AuthMode::ApiKey,
                api_key: ApiKeyMode {
                    expires_in_days: DEFAULT_API_KEY_EXPIRY_DAYS,
                },
            },
        }
    }

    pub fn with_api_key_expiry(mut self, days: u32) -> Self {
        self.authorization.api_key.expires_in_days = days;
        self
    }

    pub fn query(&self, name: &str) -> Option<&QueryOperation> {
        self.queries.iter().find(|q| q.name == name)
    }

    pub fn custom_type(&self, name: &str) -> Option<&CustomType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn rule_for(&self, op: &QueryOperation) -> AuthRule {
        self.authorization.rule_for(op)
    }

    /// Data sources every query is bound to, in declaration order.
    pub fn data_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for q in &self.queries {
            if !out.contains(&q.handler.data_source.as_str()) {
                out.push(q.handler.data_source.as_str());
            }
        }
        out
    }

    /// Render the declaration as GraphQL SDL.
    pub fn to_sdl(&self) -> String {
        let mut out = format!(
            "# default authorization: {:?} (keys expire after {} days)\n\n",
            self.authorization.default_mode, self.authorization.api_key.expires_in_days
        );
        for ty in &self.types {
            out.push_str(&format!("type {} {{\n", ty.name));
            for f in &ty.fields {
                out.push_str(&format!("  {}\n", f.sdl()));
            }
            out.push_str("}\n\n");
        }
        out.push_str("type Query {\n");
        for q in &self.queries {
            out.push_str(&q.sdl());
            out.push('\n');
        }
        out.push_str("}\n");
        out
    }
}
