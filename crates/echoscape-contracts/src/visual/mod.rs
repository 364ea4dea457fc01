mod descriptor;
mod fallback;
mod reframe;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::emotion::{clamp_unit, dominant_emotion, EmotionVector, PrimaryEmotion};

pub use descriptor::{
    build_scene_descriptor, CameraSpec, CompositionSpec, LightingSpec, PaletteSpec,
    SceneDescriptor,
};
pub use fallback::{curated_images, pick_fallback_image};
pub use reframe::{apply_deltas, ReframeMood, DELTA_KEYS};

macro_rules! named_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(SceneType {
    AbstractLandscape => "abstract_landscape",
    SunlitMeadow => "sunlit_meadow",
    SunriseHorizon => "sunrise_horizon",
    MistyOcean => "misty_ocean",
    DarkForest => "dark_forest",
    StormyVolcanic => "stormy_volcanic",
    ShadowyCavern => "shadowy_cavern",
    PeacefulLake => "peaceful_lake",
    FoggyMaze => "foggy_maze",
    RoseGarden => "rose_garden",
    MountainLake => "mountain_lake",
    GoldenValley => "golden_valley",
    EmptyShore => "empty_shore",
    RainSweptCoast => "rain_swept_coast",
    MountainSummit => "mountain_summit",
});

named_enum!(ColorPalette {
    Neutral => "neutral",
    WarmGold => "warm_gold",
    WarmAmber => "warm_amber",
    CoolBlue => "cool_blue",
    GrayTeal => "gray_teal",
    HotRed => "hot_red",
    DarkPurple => "dark_purple",
    SoftBlue => "soft_blue",
    MutedGray => "muted_gray",
    RosePink => "rose_pink",
    SoftGreen => "soft_green",
    CoolGray => "cool_gray",
    SlateBlue => "slate_blue",
    BoldOrange => "bold_orange",
    EarthBronze => "earth_bronze",
});

named_enum!(CameraAngle {
    Wide => "wide",
    Medium => "medium",
    Close => "close",
    DramaticLow => "dramatic_low",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualParameters {
    pub emotion: String,
    pub scene_type: SceneType,
    pub camera_angle: CameraAngle,
    pub light_level: f64,
    pub color_palette: ColorPalette,
    pub openness: f64,
    pub contrast: f64,
    pub warmth: Option<f64>,
}

impl VisualParameters {
    fn base(emotion: &str) -> Self {
        Self {
            emotion: emotion.to_string(),
            scene_type: SceneType::AbstractLandscape,
            camera_angle: CameraAngle::Medium,
            light_level: 0.5,
            color_palette: ColorPalette::Neutral,
            openness: 0.5,
            contrast: 0.5,
            warmth: Some(0.5),
        }
    }

    pub fn warmth_or_default(&self) -> f64 {
        self.warmth.unwrap_or(0.5)
    }

    fn clamped(mut self) -> Self {
        self.light_level = clamp_unit(self.light_level);
        self.openness = clamp_unit(self.openness);
        self.contrast = clamp_unit(self.contrast);
        self.warmth = self.warmth.map(clamp_unit);
        self
    }
}

/// Partial override applied on top of the base parameters.
#[derive(Debug, Clone, Copy)]
struct SceneOverride {
    scene_type: SceneType,
    color_palette: ColorPalette,
    light_level: f64,
    openness: f64,
    contrast: Option<f64>,
    warmth: Option<f64>,
}

impl SceneOverride {
    fn apply(&self, params: &mut VisualParameters) {
        params.scene_type = self.scene_type;
        params.color_palette = self.color_palette;
        params.light_level = self.light_level;
        params.openness = self.openness;
        if let Some(contrast) = self.contrast {
            params.contrast = contrast;
        }
        if let Some(warmth) = self.warmth {
            params.warmth = Some(warmth);
        }
    }
}

#[rustfmt::skip]
fn scene_override(emotion: PrimaryEmotion) -> SceneOverride {
    let entry = |scene_type, color_palette, light_level, openness, contrast, warmth| SceneOverride {
        scene_type,
        color_palette,
        light_level,
        openness,
        contrast,
        warmth,
    };
    match emotion {
        PrimaryEmotion::Joy => entry(SceneType::SunlitMeadow, ColorPalette::WarmGold, 0.9, 0.9, None, Some(0.8)),
        PrimaryEmotion::Hope => entry(SceneType::SunriseHorizon, ColorPalette::WarmAmber, 0.8, 0.8, None, Some(0.7)),
        PrimaryEmotion::Sadness => entry(SceneType::MistyOcean, ColorPalette::CoolBlue, 0.3, 0.4, None, Some(0.3)),
        PrimaryEmotion::Anxiety => entry(SceneType::DarkForest, ColorPalette::GrayTeal, 0.2, 0.2, Some(0.8), None),
        PrimaryEmotion::Anger => entry(SceneType::StormyVolcanic, ColorPalette::HotRed, 0.4, 0.2, Some(0.9), None),
        PrimaryEmotion::Fear => entry(SceneType::ShadowyCavern, ColorPalette::DarkPurple, 0.1, 0.1, Some(0.7), None),
        PrimaryEmotion::Calm => entry(SceneType::PeacefulLake, ColorPalette::SoftBlue, 0.6, 0.7, None, Some(0.5)),
        PrimaryEmotion::Confusion => entry(SceneType::FoggyMaze, ColorPalette::MutedGray, 0.4, 0.3, Some(0.5), None),
        PrimaryEmotion::Love => entry(SceneType::RoseGarden, ColorPalette::RosePink, 0.7, 0.6, None, Some(0.9)),
        PrimaryEmotion::Peace => entry(SceneType::MountainLake, ColorPalette::SoftGreen, 0.7, 0.8, Some(0.4), Some(0.6)),
        PrimaryEmotion::Gratitude => entry(SceneType::GoldenValley, ColorPalette::WarmGold, 0.8, 0.7, None, Some(0.8)),
        PrimaryEmotion::Loneliness => entry(SceneType::EmptyShore, ColorPalette::CoolGray, 0.3, 0.9, None, Some(0.3)),
        PrimaryEmotion::Grief => entry(SceneType::RainSweptCoast, ColorPalette::SlateBlue, 0.2, 0.3, Some(0.6), Some(0.2)),
        PrimaryEmotion::Frustration => entry(SceneType::StormyVolcanic, ColorPalette::BoldOrange, 0.4, 0.3, Some(0.8), None),
        PrimaryEmotion::Determination => entry(SceneType::MountainSummit, ColorPalette::EarthBronze, 0.7, 0.8, Some(0.7), Some(0.6)),
    }
}

/// Deterministic mapping from an emotion vector to scene parameters.
///
/// The dominant label picks a table entry (unknown labels use calm's); a
/// dominant score above 0.7 adds 0.2 contrast.
pub fn map_to_visual_params(vector: &EmotionVector) -> VisualParameters {
    let (label, score) = dominant_emotion(vector);
    let emotion = PrimaryEmotion::parse(&label).unwrap_or(PrimaryEmotion::Calm);

    let mut params = VisualParameters::base(&label);
    scene_override(emotion).apply(&mut params);
    if score > 0.7 {
        params.contrast = (params.contrast + 0.2).min(1.0);
    }
    params.clamped()
}
