pub mod provider;
pub mod providers;
pub mod recipe;

pub use provider::{LlmError, LlmProvider, Message, Role};
pub use recipe::RecipeGenerator;
