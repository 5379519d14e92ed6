mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, DEFAULT_MODEL};
pub use selectors::{ModelFallback, ModelSelection, ModelSelector, NoChatModels, CHAT_CAPABILITY};
