use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::VisualParameters;
use crate::emotion::clamp_unit;

/// Recognized delta keys, in the order their effects are applied.
pub const DELTA_KEYS: &[&str] = &["hope", "intensity", "openness", "warmth", "light_level"];

/// Applies reframe deltas to a base parameter set.
///
/// Effects run in [`DELTA_KEYS`] order and each step is clamped to `[0, 1]`
/// before the next one reads the field, so `hope` then `light_level` both
/// move the light level, the direct delta last. Unknown keys, zero deltas and
/// non-finite deltas are ignored; an empty map returns `base` unchanged.
pub fn apply_deltas(base: &VisualParameters, deltas: &BTreeMap<String, f64>) -> VisualParameters {
    let mut params = base.clone();
    let delta = |key: &str| {
        deltas
            .get(key)
            .copied()
            .filter(|value| value.is_finite() && *value != 0.0)
    };

    if let Some(hope) = delta("hope") {
        params.light_level = clamp_unit(params.light_level + hope * 0.4);
        params.warmth = Some(clamp_unit(params.warmth_or_default() + hope * 0.3));
        params.openness = clamp_unit(params.openness + hope * 0.3);
    }
    if let Some(intensity) = delta("intensity") {
        params.contrast = clamp_unit(params.contrast + intensity * 0.3);
    }
    if let Some(openness) = delta("openness") {
        params.openness = clamp_unit(params.openness + openness);
    }
    if let Some(warmth) = delta("warmth") {
        params.warmth = Some(clamp_unit(params.warmth_or_default() + warmth));
    }
    if let Some(light_level) = delta("light_level") {
        params.light_level = clamp_unit(params.light_level + light_level);
    }
    params
}

/// Slider-driven reframe (`hope_level` / `intensity_level` in `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReframeMood {
    pub hope_level: f64,
    pub intensity_level: f64,
}

impl ReframeMood {
    pub fn new(hope_level: f64, intensity_level: f64) -> Self {
        Self {
            hope_level: clamp_unit(hope_level),
            intensity_level: clamp_unit(intensity_level),
        }
    }

    pub fn mood_descriptor(&self) -> &'static str {
        if self.hope_level > 0.6 {
            "hopeful, bright, divine light"
        } else {
            "moody, atmospheric"
        }
    }

    pub fn intensity_descriptor(&self) -> &'static str {
        if self.intensity_level > 0.6 {
            "intense, vibrant, high contrast"
        } else {
            "soft, muted, pastel"
        }
    }

    pub fn to_prompt(&self) -> String {
        format!(
            "A landscape transformation, {}, {}, artistic masterpiece, 8k",
            self.mood_descriptor(),
            self.intensity_descriptor()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{apply_deltas, ReframeMood};
    use crate::visual::{
        map_to_visual_params, CameraAngle, ColorPalette, SceneType, VisualParameters,
    };

    fn base() -> VisualParameters {
        VisualParameters {
            emotion: "sadness".to_string(),
            scene_type: SceneType::MistyOcean,
            camera_angle: CameraAngle::Medium,
            light_level: 0.3,
            color_palette: ColorPalette::CoolBlue,
            openness: 0.4,
            contrast: 0.5,
            warmth: Some(0.3),
        }
    }

    fn deltas(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_deltas_are_identity() {
        let params = base();
        assert_eq!(apply_deltas(&params, &BTreeMap::new()), params);

        let mut no_warmth = base();
        no_warmth.warmth = None;
        let zeroed = deltas(&[("hope", 0.0), ("warmth", 0.0)]);
        assert_eq!(apply_deltas(&no_warmth, &zeroed), no_warmth);
    }

    #[test]
    fn hope_lifts_light_warmth_and_openness() {
        let out = apply_deltas(&base(), &deltas(&[("hope", 0.5)]));
        assert!(close(out.light_level, 0.5));
        assert!(close(out.warmth_or_default(), 0.45));
        assert!(close(out.openness, 0.55));
        assert_eq!(out.contrast, 0.5);
    }

    #[test]
    fn light_level_applies_after_hope() {
        let out = apply_deltas(&base(), &deltas(&[("light_level", -0.2), ("hope", 0.5)]));
        assert!(close(out.light_level, 0.3));
    }

    #[test]
    fn large_deltas_are_clamped() {
        let out = apply_deltas(
            &base(),
            &deltas(&[
                ("hope", 5.0),
                ("intensity", -9.0),
                ("openness", 3.0),
                ("warmth", -4.0),
                ("light_level", 2.0),
            ]),
        );
        for value in [out.light_level, out.openness, out.contrast, out.warmth_or_default()] {
            assert!((0.0..=1.0).contains(&value));
        }
        assert_eq!(out.contrast, 0.0);
        assert_eq!(out.warmth, Some(0.0));
        assert_eq!(out.light_level, 1.0);
    }

    #[test]
    fn unknown_and_non_finite_keys_are_ignored() {
        let params = map_to_visual_params(&[("fear".to_string(), 0.5)].into_iter().collect());
        let out = apply_deltas(
            &params,
            &deltas(&[("saturation", 0.9), ("contrast", 0.4), ("hope", f64::NAN)]),
        );
        assert_eq!(out, params);
    }

    #[test]
    fn mood_prompt_switches_at_threshold() {
        assert_eq!(
            ReframeMood::new(0.8, 0.2).to_prompt(),
            "A landscape transformation, hopeful, bright, divine light, soft, muted, pastel, artistic masterpiece, 8k"
        );
        let flat = ReframeMood::new(0.6, 0.9);
        assert_eq!(flat.mood_descriptor(), "moody, atmospheric");
        assert_eq!(flat.intensity_descriptor(), "intense, vibrant, high contrast");
    }
}
