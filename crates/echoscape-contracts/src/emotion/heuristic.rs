use super::{EmotionSnapshot, PrimaryEmotion};

/// Offline keyword table, in tie-break order.
pub const HEURISTIC_CATEGORIES: &[(PrimaryEmotion, &[&str])] = &[
    (
        PrimaryEmotion::Joy,
        &[
            "happy",
            "excited",
            "wonderful",
            "great",
            "amazing",
            "love",
            "fantastic",
        ],
    ),
    (
        PrimaryEmotion::Sadness,
        &[
            "sad",
            "depressed",
            "down",
            "unhappy",
            "miserable",
            "crying",
            "tears",
        ],
    ),
    (
        PrimaryEmotion::Anxiety,
        &[
            "anxious",
            "worried",
            "nervous",
            "stressed",
            "overwhelmed",
            "panic",
        ],
    ),
    (
        PrimaryEmotion::Anger,
        &["angry", "frustrated", "mad", "furious", "annoyed", "irritated"],
    ),
    (
        PrimaryEmotion::Fear,
        &["scared", "afraid", "terrified", "frightened", "fearful"],
    ),
    (
        PrimaryEmotion::Hope,
        &[
            "hopeful",
            "optimistic",
            "looking forward",
            "better",
            "improving",
        ],
    ),
    (
        PrimaryEmotion::Calm,
        &["calm", "peaceful", "relaxed", "serene", "tranquil"],
    ),
    (
        PrimaryEmotion::Confusion,
        &["confused", "lost", "uncertain", "unsure", "don't know"],
    ),
];

/// Last-resort analysis when no provider can be reached.
///
/// The category with the most distinct keyword hits wins (earlier category on
/// a tie, calm when nothing hits). Intensity grows with exclamation marks,
/// shouted words and keyword hits.
pub fn analyze_keywords(text: &str) -> EmotionSnapshot {
    let lowered = text.to_lowercase();

    let mut detected = PrimaryEmotion::Calm;
    let mut best_hits = 0usize;
    for (emotion, keywords) in HEURISTIC_CATEGORIES {
        let hits = keywords
            .iter()
            .filter(|keyword| lowered.contains(*keyword))
            .count();
        if hits > best_hits {
            best_hits = hits;
            detected = *emotion;
        }
    }

    let exclamations = text.chars().filter(|ch| *ch == '!').count();
    let caps = count_caps_runs(text);
    let intensity =
        0.3 + exclamations as f64 * 0.1 + caps as f64 * 0.15 + best_hits as f64 * 0.2;
    let confidence = if best_hits > 0 { 0.7 } else { 0.3 };

    EmotionSnapshot::new(
        detected,
        None,
        intensity.min(1.0),
        confidence,
        format!("A landscape representing {detected}"),
    )
}

/// Maximal runs of two or more ASCII capitals ("NO WAY" counts two).
fn count_caps_runs(text: &str) -> usize {
    let mut runs = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch.is_ascii_uppercase() {
            current += 1;
            continue;
        }
        if current >= 2 {
            runs += 1;
        }
        current = 0;
    }
    if current >= 2 {
        runs += 1;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::{analyze_keywords, count_caps_runs};
    use crate::emotion::PrimaryEmotion;

    #[test]
    fn no_keywords_is_low_confidence_calm() {
        let snapshot = analyze_keywords("I went to the store.");
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Calm);
        assert!((snapshot.intensity - 0.3).abs() < 1e-9);
        assert_eq!(snapshot.confidence, 0.3);
    }

    #[test]
    fn most_hits_wins() {
        let snapshot = analyze_keywords("I'm so worried and nervous, but it was a great day");
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Anxiety);
        assert!((snapshot.intensity - 0.7).abs() < 1e-9);
        assert_eq!(snapshot.confidence, 0.7);
    }

    #[test]
    fn tie_goes_to_earlier_category() {
        let snapshot = analyze_keywords("happy but sad");
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Joy);
    }

    #[test]
    fn exclamations_and_caps_raise_intensity_and_cap_at_one() {
        let snapshot = analyze_keywords("I am SO ANGRY and FURIOUS!!!");
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Anger);
        assert_eq!(snapshot.intensity, 1.0);
    }

    #[test]
    fn caps_runs_need_two_letters() {
        assert_eq!(count_caps_runs("I am OK"), 1);
        assert_eq!(count_caps_runs("NO WAY"), 2);
        assert_eq!(count_caps_runs("A B C"), 0);
    }
}
