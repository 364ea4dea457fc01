use indexmap::IndexMap;

use super::{EmotionSnapshot, EmotionVector, PrimaryEmotion};

/// Frequency-weighted composite of many snapshots.
///
/// Each primary label scores `(count / total) * mean_intensity`, so a label
/// that shows up often and strongly outweighs a single intense outlier.
/// Labels keep the order in which they were first seen.
pub fn aggregate(snapshots: &[EmotionSnapshot]) -> EmotionVector {
    let mut vector = EmotionVector::new();
    if snapshots.is_empty() {
        vector.insert(PrimaryEmotion::Calm.as_str().to_string(), 0.5);
        return vector;
    }

    let mut grouped: IndexMap<&'static str, (usize, f64)> = IndexMap::new();
    for snapshot in snapshots {
        let entry = grouped
            .entry(snapshot.primary_emotion.as_str())
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += snapshot.intensity;
    }

    let total = snapshots.len() as f64;
    for (label, (count, intensity_sum)) in grouped {
        let count = count as f64;
        let mean = intensity_sum / count;
        vector.insert(label.to_string(), (count / total) * mean);
    }
    vector
}

/// Label and score of the strongest entry. Ties keep the first-seen label;
/// an empty or all-zero vector resolves to `("calm", 0.0)`.
pub fn dominant_emotion(vector: &EmotionVector) -> (String, f64) {
    let mut label = PrimaryEmotion::Calm.as_str();
    let mut best = 0.0;
    for (candidate, score) in vector {
        if *score > best {
            best = *score;
            label = candidate.as_str();
        }
    }
    (label.to_string(), best)
}

pub fn primary_emotion(vector: &EmotionVector) -> String {
    dominant_emotion(vector).0
}

#[cfg(test)]
mod tests {
    use super::{aggregate, dominant_emotion, primary_emotion};
    use crate::emotion::{EmotionSnapshot, EmotionVector, PrimaryEmotion};

    fn snap(emotion: PrimaryEmotion, intensity: f64) -> EmotionSnapshot {
        EmotionSnapshot::new(emotion, None, intensity, 0.8, "test")
    }

    #[test]
    fn empty_input_is_calm_half() {
        let vector = aggregate(&[]);
        assert_eq!(vector.len(), 1);
        assert_eq!(vector.get("calm"), Some(&0.5));
    }

    #[test]
    fn identical_snapshots_reduce_to_their_intensity() {
        let snapshots = vec![snap(PrimaryEmotion::Hope, 0.7); 5];
        let vector = aggregate(&snapshots);
        assert_eq!(vector.len(), 1);
        let value = vector.get("hope").copied().unwrap_or_default();
        assert!((value - 0.7).abs() < 1e-9);
    }

    #[test]
    fn frequency_outweighs_single_intense_entry() {
        let snapshots = vec![
            snap(PrimaryEmotion::Anxiety, 0.6),
            snap(PrimaryEmotion::Joy, 1.0),
            snap(PrimaryEmotion::Anxiety, 0.6),
            snap(PrimaryEmotion::Anxiety, 0.6),
        ];
        let vector = aggregate(&snapshots);
        let anxiety = vector.get("anxiety").copied().unwrap_or_default();
        let joy = vector.get("joy").copied().unwrap_or_default();
        assert!((anxiety - 0.45).abs() < 1e-9);
        assert!((joy - 0.25).abs() < 1e-9);
        assert_eq!(primary_emotion(&vector), "anxiety");
        assert_eq!(
            vector.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["anxiety", "joy"]
        );
    }

    #[test]
    fn ties_keep_first_seen_label() {
        let mut vector = EmotionVector::new();
        vector.insert("grief".to_string(), 0.4);
        vector.insert("anger".to_string(), 0.4);
        assert_eq!(dominant_emotion(&vector), ("grief".to_string(), 0.4));
    }

    #[test]
    fn all_zero_vector_is_calm() {
        let mut vector = EmotionVector::new();
        vector.insert("fear".to_string(), 0.0);
        assert_eq!(primary_emotion(&vector), "calm");
        assert_eq!(primary_emotion(&EmotionVector::new()), "calm");
    }
}
