use std::fmt;

use super::registry::{ModelRegistry, ModelSpec};

/// Capability every tutoring model must have; image support is optional.
pub const CHAT_CAPABILITY: &str = "text";

/// Why the chosen model is not the one that was asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFallback {
    NotRequested,
    Unknown(String),
    NoChatModels,
}

impl fmt::Display for ModelFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFallback::NotRequested => write!(f, "No model chosen; using the default tutor model."),
            ModelFallback::Unknown(name) => {
                write!(f, "'{name}' is not a known tutor model; using the default.")
            }
            ModelFallback::NoChatModels => {
                write!(f, "No tutor models are registered; using the built-in default.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub fallback: Option<ModelFallback>,
}

impl ModelSelection {
    /// Worth telling the student about: a name they typed was not honoured.
    pub fn warning(&self) -> Option<String> {
        match &self.fallback {
            None | Some(ModelFallback::NotRequested) => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoChatModels;

impl fmt::Display for NoChatModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no registered model can hold a tutoring chat")
    }
}

impl std::error::Error for NoChatModels {}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// A known chat model is used as asked. Anything else, including a
    /// blank name, gets the registry's first chat model.
    pub fn select(&self, requested: Option<&str>) -> Result<ModelSelection, NoChatModels> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        if let Some(model) = requested.and_then(|name| self.registry.ensure(name, CHAT_CAPABILITY)) {
            return Ok(ModelSelection {
                model,
                fallback: None,
            });
        }
        let model = self
            .registry
            .by_capability(CHAT_CAPABILITY)
            .into_iter()
            .next()
            .ok_or(NoChatModels)?;
        let fallback = match requested {
            Some(name) => ModelFallback::Unknown(name.to_string()),
            None => ModelFallback::NotRequested,
        };
        Ok(ModelSelection {
            model,
            fallback: Some(fallback),
        })
    }
}
