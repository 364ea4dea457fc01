mod registry;
mod selectors;

pub use registry::{
    ModelRegistry, ModelSpec, CAPABILITY_ANALYSIS, CAPABILITY_CHAT, CAPABILITY_IMAGE,
};
pub use selectors::{ModelSelection, ModelSelector};
