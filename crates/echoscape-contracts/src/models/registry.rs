use indexmap::IndexMap;

pub const CAPABILITY_ANALYSIS: &str = "analysis";
pub const CAPABILITY_CHAT: &str = "chat";
pub const CAPABILITY_IMAGE: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Models for one provider with one capability, registry order.
    pub fn candidates(&self, provider: &str, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.provider == provider && model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, provider: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.provider == provider && model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str], context_window| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
            },
        );
    };

    insert(
        "gpt-4o-mini",
        "openai",
        &[CAPABILITY_ANALYSIS, CAPABILITY_CHAT],
        Some(128000),
    );
    insert(
        "gpt-4o",
        "openai",
        &[CAPABILITY_ANALYSIS, CAPABILITY_CHAT],
        Some(128000),
    );
    insert(
        "gemini-1.5-flash",
        "gemini",
        &[CAPABILITY_ANALYSIS, CAPABILITY_CHAT],
        Some(1_000_000),
    );
    insert(
        "gemini-1.5-pro",
        "gemini",
        &[CAPABILITY_ANALYSIS, CAPABILITY_CHAT],
        Some(2_000_000),
    );
    insert("fal-ai/fast-sdxl", "fal", &[CAPABILITY_IMAGE], None);
    insert("fal-ai/flux/schnell", "fal", &[CAPABILITY_IMAGE], None);

    map
}
