use indexmap::IndexMap;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub label: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Chat models offered in settings. Insertion order is preference order:
/// the first model supporting a capability is its default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, label: &str, capabilities: &[&str], context_window: Option<u64>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                label: label.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
            },
        );
    };

    insert(
        DEFAULT_MODEL,
        "Gemini 3 Flash (fast, recommended)",
        &["text", "vision"],
        Some(1_048_576),
    );
    insert(
        "gemini-3-pro-preview",
        "Gemini 3 Pro (deeper reasoning)",
        &["text", "vision"],
        Some(1_048_576),
    );
    insert(
        "gemini-2.5-flash",
        "Gemini 2.5 Flash",
        &["text", "vision"],
        Some(1_048_576),
    );
    insert(
        "gemini-2.5-pro",
        "Gemini 2.5 Pro",
        &["text", "vision"],
        Some(1_048_576),
    );
    insert(
        "gemini-2.5-flash-lite",
        "Gemini 2.5 Flash Lite (text only)",
        &["text"],
        Some(1_048_576),
    );

    map
}
