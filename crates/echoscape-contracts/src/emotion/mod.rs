mod aggregate;
mod heuristic;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use aggregate::{aggregate, dominant_emotion, primary_emotion};
pub use heuristic::{analyze_keywords, HEURISTIC_CATEGORIES};

/// Emotion label → intensity, in first-seen order.
///
/// Insertion order is part of the contract: every "max wins" scan over a
/// vector keeps the first label it saw on a tie.
pub type EmotionVector = IndexMap<String, f64>;

pub const NEUTRAL_SECONDARY: &str = "clarity";
pub const NEUTRAL_METAPHOR: &str = "A quiet, fog-covered lake";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryEmotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Anxiety,
    Peace,
    Hope,
    Love,
    Loneliness,
    Grief,
    Frustration,
    Confusion,
    Determination,
    Gratitude,
    Calm,
}

impl PrimaryEmotion {
    pub const ALL: [PrimaryEmotion; 15] = [
        PrimaryEmotion::Joy,
        PrimaryEmotion::Sadness,
        PrimaryEmotion::Anger,
        PrimaryEmotion::Fear,
        PrimaryEmotion::Anxiety,
        PrimaryEmotion::Peace,
        PrimaryEmotion::Hope,
        PrimaryEmotion::Love,
        PrimaryEmotion::Loneliness,
        PrimaryEmotion::Grief,
        PrimaryEmotion::Frustration,
        PrimaryEmotion::Confusion,
        PrimaryEmotion::Determination,
        PrimaryEmotion::Gratitude,
        PrimaryEmotion::Calm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrimaryEmotion::Joy => "joy",
            PrimaryEmotion::Sadness => "sadness",
            PrimaryEmotion::Anger => "anger",
            PrimaryEmotion::Fear => "fear",
            PrimaryEmotion::Anxiety => "anxiety",
            PrimaryEmotion::Peace => "peace",
            PrimaryEmotion::Hope => "hope",
            PrimaryEmotion::Love => "love",
            PrimaryEmotion::Loneliness => "loneliness",
            PrimaryEmotion::Grief => "grief",
            PrimaryEmotion::Frustration => "frustration",
            PrimaryEmotion::Confusion => "confusion",
            PrimaryEmotion::Determination => "determination",
            PrimaryEmotion::Gratitude => "gratitude",
            PrimaryEmotion::Calm => "calm",
        }
    }

    /// Case-insensitive lookup; anything outside the closed vocabulary is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|emotion| emotion.as_str() == normalized)
    }
}

impl fmt::Display for PrimaryEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analyzed message. Built through [`EmotionSnapshot::new`] so the
/// numeric fields are always inside `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub primary_emotion: PrimaryEmotion,
    pub secondary_emotion: Option<String>,
    pub intensity: f64,
    pub confidence: f64,
    pub scene_metaphor: String,
}

impl EmotionSnapshot {
    pub fn new(
        primary_emotion: PrimaryEmotion,
        secondary_emotion: Option<String>,
        intensity: f64,
        confidence: f64,
        scene_metaphor: impl Into<String>,
    ) -> Self {
        Self {
            primary_emotion,
            secondary_emotion: secondary_emotion
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty()),
            intensity: clamp_unit(intensity),
            confidence: clamp_unit(confidence),
            scene_metaphor: scene_metaphor.into(),
        }
    }

    pub fn neutral() -> Self {
        Self::new(
            PrimaryEmotion::Calm,
            Some(NEUTRAL_SECONDARY.to_string()),
            0.1,
            0.5,
            NEUTRAL_METAPHOR,
        )
    }

    pub fn metaphor_or_default(&self) -> String {
        let trimmed = self.scene_metaphor.trim();
        if trimmed.is_empty() {
            return format!("A representation of {}", self.primary_emotion);
        }
        trimmed.to_string()
    }

    /// Single-message vector: the primary at full intensity, the secondary at
    /// half. A secondary that repeats the primary label is not re-inserted.
    pub fn to_vector(&self) -> EmotionVector {
        let mut vector = EmotionVector::new();
        vector.insert(self.primary_emotion.as_str().to_string(), self.intensity);
        if let Some(secondary) = self.secondary_emotion.as_deref() {
            if !vector.contains_key(secondary) {
                vector.insert(secondary.to_string(), clamp_unit(self.intensity * 0.5));
            }
        }
        vector
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
