use anyhow::{bail, Result};

use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves `requested` for a provider/capability pair. An unknown or
    /// mismatched id falls back to the provider's first registered model.
    pub fn select(
        &self,
        provider: &str,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(name) => {
                if let Some(model) = self.registry.ensure(name, provider, capability) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                format!(
                    "Requested model '{name}' unavailable for provider '{provider}' capability '{capability}'."
                )
            }
            None => "No model specified; using default.".to_string(),
        };

        let Some(model) = self
            .registry
            .candidates(provider, capability)
            .into_iter()
            .next()
        else {
            bail!("No models available for provider '{provider}' capability '{capability}'.");
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{ModelRegistry, ModelSpec, CAPABILITY_ANALYSIS, CAPABILITY_IMAGE};

    #[test]
    fn known_model_is_selected_without_fallback() -> anyhow::Result<()> {
        let selection = ModelSelector::default().select("gemini", Some("gemini-1.5-pro"), CAPABILITY_ANALYSIS)?;
        assert_eq!(selection.model.name, "gemini-1.5-pro");
        assert!(selection.fallback_reason.is_none());
        Ok(())
    }

    #[test]
    fn unknown_model_falls_back_to_provider_default() -> anyhow::Result<()> {
        let selection = ModelSelector::default().select("openai", Some("gpt-9"), CAPABILITY_ANALYSIS)?;
        assert_eq!(selection.model.name, "gpt-4o-mini");
        assert_eq!(selection.requested.as_deref(), Some("gpt-9"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'gpt-9' unavailable for provider 'openai' capability 'analysis'.")
        );

        let image = ModelSelector::default().select("fal", None, CAPABILITY_IMAGE)?;
        assert_eq!(image.model.name, "fal-ai/fast-sdxl");
        assert_eq!(
            image.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        Ok(())
    }

    #[test]
    fn cross_provider_ids_are_rejected() -> anyhow::Result<()> {
        let selection = ModelSelector::default().select("gemini", Some("gpt-4o"), CAPABILITY_ANALYSIS)?;
        assert_eq!(selection.model.name, "gemini-1.5-flash");
        assert!(selection.fallback_reason.is_some());
        Ok(())
    }

    #[test]
    fn empty_registry_is_an_error() {
        let selector = ModelSelector::new(Some(ModelRegistry::new(Some(IndexMap::<String, ModelSpec>::new()))));
        let err = selector
            .select("fal", None, CAPABILITY_IMAGE)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "No models available for provider 'fal' capability 'image'.");
    }
}
