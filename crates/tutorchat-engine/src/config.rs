use std::env;
use std::time::Duration;

use tutorchat_contracts::models::{
    ModelFallback, ModelSelection, ModelSelector, ModelSpec, CHAT_CAPABILITY, DEFAULT_MODEL,
};

use crate::backend::SessionConfig;
use crate::prompts::SYSTEM_INSTRUCTION;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4000;
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn api_base_from_env() -> String {
    non_empty_env("GEMINI_API_BASE")
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

pub fn request_timeout_from_env() -> Duration {
    let seconds = non_empty_env("TUTORCHAT_REQUEST_TIMEOUT")
        .and_then(|value| value.parse::<f64>().ok());
    Duration::from_secs_f64(clamp_timeout(seconds))
}

fn clamp_timeout(seconds: Option<f64>) -> f64 {
    match seconds {
        Some(value) if value.is_finite() => value.clamp(15.0, 300.0),
        _ => DEFAULT_REQUEST_TIMEOUT_S,
    }
}

/// Resolves a requested model against the registry, falling back to the
/// default text model.
pub fn resolve_model(requested: Option<&str>) -> ModelSelection {
    ModelSelector::new(None)
        .select(requested)
        .unwrap_or_else(|_| ModelSelection {
            model: ModelSpec {
                name: DEFAULT_MODEL.to_string(),
                label: DEFAULT_MODEL.to_string(),
                capabilities: vec![CHAT_CAPABILITY.to_string()],
                context_window: None,
            },
            fallback: Some(ModelFallback::NoChatModels),
        })
}

pub fn session_config(model: impl Into<String>) -> SessionConfig {
    SessionConfig {
        model: model.into(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        temperature: DEFAULT_TEMPERATURE,
        max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
    }
}
