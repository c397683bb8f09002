pub mod config;
pub mod error;
pub mod schema;

pub use config::Config;
pub use error::*;
pub use schema::{
    AskBedrockArgs, AuthMode, AuthRule, AuthorizationModes, BedrockResponse, DataSchema,
    HandlerBinding, QueryOperation,
};
