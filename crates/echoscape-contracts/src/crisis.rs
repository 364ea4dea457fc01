use serde::{Deserialize, Serialize};

pub const CRISIS_KEYWORDS: &[&str] = &[
    "suicide",
    "kill myself",
    "end it all",
    "better off dead",
    "hurt myself",
    "cutting",
    "overdose",
    "die",
    "death",
];

pub const CRISIS_RISK_SCORE: f64 = 0.9;

/// Reply used in place of the coach whenever the gate trips.
pub const CRISIS_SAFETY_MESSAGE: &str = "I hear how much pain you're in, and I want you to be safe. \
Please reach out to a professional or a crisis support line right away. \
You don't have to carry this alone.\n\n\
National Suicide Prevention Lifeline: 988\n\
Crisis Text Line: Text HOME to 741741\n\
International: findahelpline.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisResult {
    pub is_crisis: bool,
    pub risk_score: f64,
    pub detected_keywords: Vec<String>,
}

/// Case-insensitive substring scan. The score is binary, not graded.
pub fn evaluate(text: &str) -> CrisisResult {
    let lowered = text.to_lowercase();
    let detected_keywords = CRISIS_KEYWORDS
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .map(|keyword| (*keyword).to_string())
        .collect::<Vec<String>>();
    let is_crisis = !detected_keywords.is_empty();
    CrisisResult {
        is_crisis,
        risk_score: if is_crisis { CRISIS_RISK_SCORE } else { 0.0 },
        detected_keywords,
    }
}
