use std::path::Path;

use serde::{Deserialize, Serialize};

use super::store::{Message, Role};
use crate::emotion::{aggregate, primary_emotion, EmotionVector};
use crate::events::now_utc_iso;

pub const SUMMARY_METAPHOR: &str = "A moment of introspection";
pub const DEFAULT_THEME: &str = "reflection";

const THEME_KEYWORDS: &[(&str, &[&str])] = &[
    ("work", &["work", "job"]),
    ("family", &["family", "parent"]),
    ("stress", &["stress", "anxious"]),
    ("positive emotions", &["happy", "joy"]),
    ("difficult emotions", &["sad", "down"]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub summary: String,
    pub themes: Vec<String>,
    pub metaphor: String,
    pub emotion_vector: EmotionVector,
    pub primary_emotion: String,
    pub ended_at: String,
}

/// Themes in declaration order, substring match over every message.
pub fn detect_themes(messages: &[Message]) -> Vec<String> {
    let content = messages
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let themes = THEME_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|keyword| content.contains(keyword)))
        .map(|(theme, _)| (*theme).to_string())
        .collect::<Vec<_>>();
    if themes.is_empty() {
        return vec![DEFAULT_THEME.to_string()];
    }
    themes
}

pub fn build_summary(session_id: &str, messages: &[Message]) -> SessionSummary {
    let snapshots = messages
        .iter()
        .filter(|message| message.role == Role::User)
        .filter_map(|message| message.emotion_snapshot.clone())
        .collect::<Vec<_>>();
    let emotion_vector = aggregate(&snapshots);
    SessionSummary {
        session_id: session_id.to_string(),
        message_count: messages.len(),
        summary: format!(
            "Session with {} messages exploring personal thoughts and feelings.",
            messages.len()
        ),
        themes: detect_themes(messages),
        metaphor: SUMMARY_METAPHOR.to_string(),
        primary_emotion: primary_emotion(&emotion_vector),
        emotion_vector,
        ended_at: now_utc_iso(),
    }
}

pub fn write_summary(path: &Path, summary: &SessionSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
