use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::VisualParameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub distance: f64,
    pub fov: u32,
    pub angle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingSpec {
    pub intensity: f64,
    pub direction: String,
    pub color: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteSpec {
    pub mood: String,
    pub temperature: f64,
    pub saturation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSpec {
    pub tension: f64,
    pub openness: f64,
    pub balance: String,
}

/// Structured scene spec handed to the image generator ("FIBO JSON").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub prompt: String,
    pub camera: CameraSpec,
    pub lighting: LightingSpec,
    pub palette: PaletteSpec,
    pub composition: CompositionSpec,
    pub style: String,
}

impl SceneDescriptor {
    /// Text prompt sent to the image provider.
    pub fn to_prompt(&self) -> String {
        let light = if self.lighting.intensity > 0.6 {
            "bright, well-lit"
        } else {
            "dim, atmospheric"
        };
        let color = if self.lighting.color == "warm" {
            "warm golden tones"
        } else {
            "cool blue tones"
        };
        let space = if self.composition.openness > 0.5 {
            "vast, expansive"
        } else {
            "intimate, enclosed"
        };
        format!(
            "{}. {light}, {color}, {space}. Cinematic photography, ultra detailed, 8k resolution, emotional atmosphere.",
            self.prompt
        )
    }

    /// Stable sha256 of the serialized descriptor, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }
}

pub fn build_scene_descriptor(params: &VisualParameters, metaphor: &str) -> SceneDescriptor {
    let wide = params.openness > 0.5;
    let warmth = params.warmth_or_default();
    SceneDescriptor {
        prompt: format!(
            "{} representing {}. Style: cinematic, emotional, 8k render.",
            params.scene_type,
            metaphor.trim()
        ),
        camera: CameraSpec {
            distance: if wide { 0.8 } else { 0.3 },
            fov: if wide { 70 } else { 40 },
            angle: params.camera_angle.to_string(),
        },
        lighting: LightingSpec {
            intensity: params.light_level,
            direction: "forward".to_string(),
            color: if params.warmth.is_some_and(|value| value > 0.5) {
                "warm".to_string()
            } else {
                "cool".to_string()
            },
            temperature: warmth,
        },
        palette: PaletteSpec {
            mood: params.color_palette.to_string(),
            temperature: warmth,
            saturation: 0.7,
        },
        composition: CompositionSpec {
            tension: params.contrast,
            openness: params.openness,
            balance: "centered".to_string(),
        },
        style: "cinematic_emotional".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::build_scene_descriptor;
    use crate::visual::{CameraAngle, ColorPalette, SceneType, VisualParameters};

    fn params(openness: f64, warmth: Option<f64>) -> VisualParameters {
        VisualParameters {
            emotion: "hope".to_string(),
            scene_type: SceneType::SunriseHorizon,
            camera_angle: CameraAngle::Medium,
            light_level: 0.8,
            color_palette: ColorPalette::WarmAmber,
            openness,
            contrast: 0.45,
            warmth,
        }
    }

    #[test]
    fn wide_warm_scene() {
        let descriptor = build_scene_descriptor(&params(0.8, Some(0.7)), "a path into the dawn");
        assert_eq!(
            descriptor.prompt,
            "sunrise_horizon representing a path into the dawn. Style: cinematic, emotional, 8k render."
        );
        assert_eq!(descriptor.camera.distance, 0.8);
        assert_eq!(descriptor.camera.fov, 70);
        assert_eq!(descriptor.camera.angle, "medium");
        assert_eq!(descriptor.lighting.color, "warm");
        assert_eq!(descriptor.lighting.temperature, 0.7);
        assert_eq!(descriptor.composition.tension, 0.45);
        assert_eq!(descriptor.palette.mood, "warm_amber");
    }

    #[test]
    fn tight_cool_scene_at_thresholds() {
        let descriptor = build_scene_descriptor(&params(0.5, Some(0.5)), "fog");
        assert_eq!(descriptor.camera.distance, 0.3);
        assert_eq!(descriptor.camera.fov, 40);
        assert_eq!(descriptor.lighting.color, "cool");

        let missing = build_scene_descriptor(&params(0.2, None), "fog");
        assert_eq!(missing.lighting.color, "cool");
        assert_eq!(missing.lighting.temperature, 0.5);
    }

    #[test]
    fn serializes_as_fibo_json_shape() -> anyhow::Result<()> {
        let descriptor = build_scene_descriptor(&params(0.8, Some(0.7)), "dawn");
        let value = serde_json::to_value(&descriptor)?;
        assert_eq!(value["camera"]["fov"], json!(70));
        assert_eq!(value["composition"]["balance"], json!("centered"));
        assert_eq!(value["style"], json!("cinematic_emotional"));
        Ok(())
    }

    #[test]
    fn provider_prompt_and_fingerprint_are_deterministic() {
        let a = build_scene_descriptor(&params(0.8, Some(0.7)), "dawn");
        let b = build_scene_descriptor(&params(0.8, Some(0.7)), "dawn");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        let prompt = a.to_prompt();
        assert!(prompt.contains("bright, well-lit, warm golden tones, vast, expansive"));

        let c = build_scene_descriptor(&params(0.2, Some(0.7)), "dawn");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
