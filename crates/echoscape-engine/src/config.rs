use std::env;
use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use echoscape_contracts::models::{
    ModelSelector, CAPABILITY_ANALYSIS, CAPABILITY_IMAGE,
};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_FAL_QUEUE_BASE: &str = "https://queue.fal.run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerativeBackend {
    OpenAi,
    Gemini,
}

impl GenerativeBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for GenerativeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ModelEndpoint {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

impl fmt::Debug for ModelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelEndpoint")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FalSettings {
    pub api_key: Option<String>,
    pub queue_base: String,
    pub model: String,
}

impl fmt::Debug for FalSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FalSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("queue_base", &self.queue_base)
            .field("model", &self.model)
            .finish()
    }
}

/// Everything the engine reads from the environment. Any absent credential
/// degrades the matching stage instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub classifier_url: Option<String>,
    pub openai: Option<ModelEndpoint>,
    pub gemini: Option<ModelEndpoint>,
    pub preferred_backend: Option<GenerativeBackend>,
    pub fal: FalSettings,
    pub events_path: Option<PathBuf>,
    /// Model fallback reasons collected while resolving identifiers.
    pub warnings: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier_url: None,
            openai: None,
            gemini: None,
            preferred_backend: None,
            fal: FalSettings {
                api_key: None,
                queue_base: DEFAULT_FAL_QUEUE_BASE.to_string(),
                model: "fal-ai/fast-sdxl".to_string(),
            },
            events_path: None,
            warnings: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the config from any key lookup. Values are trimmed; empty
    /// values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let base = |key: &str, default: &str| {
            get(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| default.to_string())
        };

        let selector = ModelSelector::default();
        let mut warnings = Vec::new();
        let mut resolve = |provider: &str, requested: Option<String>, capability: &str| -> Result<String> {
            let selection = selector.select(provider, requested.as_deref(), capability)?;
            if requested.is_some() {
                if let Some(reason) = selection.fallback_reason {
                    warnings.push(reason);
                }
            }
            Ok(selection.model.name)
        };

        let preferred_backend = match get("ECHOSCAPE_GENERATIVE_PROVIDER") {
            Some(raw) => match GenerativeBackend::parse(&raw) {
                Some(backend) => Some(backend),
                None => bail!(
                    "ECHOSCAPE_GENERATIVE_PROVIDER must be 'openai' or 'gemini' (got '{raw}')"
                ),
            },
            None => None,
        };

        let openai = match get("OPENAI_API_KEY") {
            Some(api_key) => Some(ModelEndpoint {
                api_key,
                api_base: base("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
                model: resolve("openai", get("OPENAI_MODEL"), CAPABILITY_ANALYSIS)?,
            }),
            None => None,
        };
        let gemini = match get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            Some(api_key) => Some(ModelEndpoint {
                api_key,
                api_base: base("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
                model: resolve("gemini", get("GEMINI_MODEL"), CAPABILITY_ANALYSIS)?,
            }),
            None => None,
        };
        let fal = FalSettings {
            api_key: get("FAL_KEY").or_else(|| get("FAL_API_KEY")),
            queue_base: base("FAL_QUEUE_BASE", DEFAULT_FAL_QUEUE_BASE),
            model: resolve("fal", get("FAL_MODEL"), CAPABILITY_IMAGE)?,
        };

        Ok(Self {
            classifier_url: get("ECHOSCAPE_CLASSIFIER_URL")
                .or_else(|| get("ML_SERVICE_URL"))
                .map(|value| value.trim_end_matches('/').to_string()),
            openai,
            gemini,
            preferred_backend,
            fal,
            events_path: get("ECHOSCAPE_EVENTS").map(PathBuf::from),
            warnings,
        })
    }

    /// The generative backend in use: the preferred one when it has
    /// credentials, otherwise whichever is configured (OpenAI first).
    pub fn active_backend(&self) -> Option<(GenerativeBackend, &ModelEndpoint)> {
        let endpoint = |backend| match backend {
            GenerativeBackend::OpenAi => self.openai.as_ref(),
            GenerativeBackend::Gemini => self.gemini.as_ref(),
        };
        if let Some(preferred) = self.preferred_backend {
            if let Some(found) = endpoint(preferred) {
                return Some((preferred, found));
            }
        }
        [GenerativeBackend::OpenAi, GenerativeBackend::Gemini]
            .into_iter()
            .find_map(|backend| endpoint(backend).map(|found| (backend, found)))
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
