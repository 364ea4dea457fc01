use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use echoscape_contracts::emotion::{analyze_keywords, EmotionSnapshot, PrimaryEmotion};
use echoscape_contracts::events::{EventLog, EventPayload};
use echoscape_contracts::providers::{NamedProvider, ProviderRegistry};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::http::{error_chain_text, http_client, response_json_or_error};
use crate::language::{parse_json_object, ChatTurn, CompletionRequest, LanguageModel};
use crate::retry::{is_rate_limited, retry_on_rate_limit, RetryPolicy, Sleeper};

const ANALYSIS_PROMPT: &str = "Analyze the emotional content of the following journal text.
Return a JSON object with these exact fields:
- primary_emotion: One of [joy, sadness, anger, fear, anxiety, peace, hope, love, loneliness, grief, frustration, confusion, determination, gratitude, calm]
- secondary_emotion: One of [elation, contentment, relief, nostalgia, overwhelm, betrayal, envy, pride, uncertainty, resilience, clarity, annoyance, excitement]
- intensity: A number from 0.0 to 1.0
- confidence: A number from 0.0 to 1.0
- scene_metaphor: A short visual description of a scene matching the emotion (e.g. \"a stormy ocean at night\" or \"a sunlit peaceful meadow\")

Return ONLY valid JSON, no markdown or extra text.";

const METAPHOR_PROMPT: &str = "Given the user's primary emotion and text, generate a JSON object with:
- scene_metaphor: A vivid visual description of a landscape reflecting this emotion
- secondary_emotion: A nuanced secondary emotion derived from the text
- confidence: A number between 0.8 to 1.0

Return ONLY valid JSON, no markdown or extra text.";

pub const CLASSIFIER_CONFIDENCE: f64 = 0.9;
pub const ENRICHMENT_FALLBACK_SECONDARY: &str = "uncertainty";

/// One way of turning text into a snapshot. A single call per `analyze`;
/// retries belong to the cascade stage wrapping the provider.
pub trait EmotionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, text: &str) -> Result<EmotionSnapshot>;
}

fn read_primary(payload: &Value, provider: &str) -> Result<PrimaryEmotion> {
    let raw = payload
        .get("primary_emotion")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match PrimaryEmotion::parse(raw) {
        Some(emotion) => Ok(emotion),
        None => bail!("{provider} returned no usable primary emotion ('{raw}')"),
    }
}

fn read_unit(payload: &Value, key: &str, default: f64) -> f64 {
    payload.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn read_text(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Full analysis payload from a generative model.
pub fn snapshot_from_payload(payload: &Value, provider: &str) -> Result<EmotionSnapshot> {
    let primary = read_primary(payload, provider)?;
    Ok(EmotionSnapshot::new(
        primary,
        read_text(payload, "secondary_emotion"),
        read_unit(payload, "intensity", 0.5),
        read_unit(payload, "confidence", 0.5),
        read_text(payload, "scene_metaphor").unwrap_or_default(),
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub scene_metaphor: String,
    pub secondary_emotion: Option<String>,
}

impl Enrichment {
    fn degraded(label: &str) -> Self {
        Self {
            scene_metaphor: format!("A landscape representing {label}"),
            secondary_emotion: Some(ENRICHMENT_FALLBACK_SECONDARY.to_string()),
        }
    }
}

/// Asks the model for a metaphor and secondary emotion for an already
/// classified message. Never fails; degrades to a generic metaphor.
pub fn enrich(
    model: Option<&dyn LanguageModel>,
    label: &str,
    text: &str,
    policy: RetryPolicy,
    sleeper: &Sleeper,
) -> Enrichment {
    let Some(model) = model else {
        return Enrichment::degraded(label);
    };
    let request = CompletionRequest {
        system: METAPHOR_PROMPT.to_string(),
        turns: vec![ChatTurn::user(format!(
            "Primary emotion: {label}\nText: \"{text}\""
        ))],
        json: true,
        temperature: 0.8,
        max_tokens: 150,
    };
    let result = retry_on_rate_limit(
        policy,
        sleeper,
        |_| {
            let raw = model.complete(&request)?;
            let payload = parse_json_object(&raw)?;
            let Some(scene_metaphor) = read_text(&payload, "scene_metaphor") else {
                bail!("{} enrichment returned no scene_metaphor", model.name());
            };
            Ok(Enrichment {
                scene_metaphor,
                secondary_emotion: read_text(&payload, "secondary_emotion"),
            })
        },
        |_, _, _| {},
    );
    result.unwrap_or_else(|_| Enrichment::degraded(label))
}

/// External ML classifier (`POST {url}/analyze`), enriched by a language
/// model when one is configured.
pub struct ClassifierProvider {
    url: String,
    http: HttpClient,
    enrichment: Option<Arc<dyn LanguageModel>>,
    enrichment_policy: RetryPolicy,
    sleeper: Sleeper,
}

impl ClassifierProvider {
    pub fn new(
        url: impl Into<String>,
        enrichment: Option<Arc<dyn LanguageModel>>,
        sleeper: Sleeper,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            http: http_client(Duration::from_secs(15)),
            enrichment,
            enrichment_policy: RetryPolicy::enrichment(),
            sleeper,
        }
    }

    /// Combines a raw classifier answer with enrichment. A label outside the
    /// vocabulary becomes `calm` and survives as the secondary emotion.
    pub fn snapshot_from_classifier(&self, payload: &Value, text: &str) -> Result<EmotionSnapshot> {
        let Some(label) = read_text(payload, "primary_emotion") else {
            bail!("classifier returned no primary emotion");
        };
        let label = label.to_ascii_lowercase();
        let (primary, unmapped) = match PrimaryEmotion::parse(&label) {
            Some(primary) => (primary, None),
            None => (PrimaryEmotion::Calm, Some(label.clone())),
        };
        let intensity = read_unit(payload, "intensity", 0.5);
        let classifier_secondary = read_text(payload, "secondary_emotion");
        let enrichment = enrich(
            self.enrichment.as_deref(),
            &label,
            text,
            self.enrichment_policy,
            &self.sleeper,
        );
        Ok(EmotionSnapshot::new(
            primary,
            classifier_secondary
                .or(unmapped)
                .or(enrichment.secondary_emotion),
            intensity,
            CLASSIFIER_CONFIDENCE,
            enrichment.scene_metaphor,
        ))
    }
}

impl EmotionProvider for ClassifierProvider {
    fn name(&self) -> &str {
        "classifier"
    }

    fn analyze(&self, text: &str) -> Result<EmotionSnapshot> {
        let endpoint = format!("{}/analyze", self.url);
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({ "text": text }))
            .send()
            .with_context(|| format!("classifier request failed ({endpoint})"))?;
        let payload = response_json_or_error("classifier", response)?;
        self.snapshot_from_classifier(&payload, text)
    }
}

/// One-call JSON analysis through a hosted language model.
pub struct GenerativeAnalyzer {
    model: Arc<dyn LanguageModel>,
}

impl GenerativeAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

impl EmotionProvider for GenerativeAnalyzer {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn analyze(&self, text: &str) -> Result<EmotionSnapshot> {
        let request = CompletionRequest {
            system: ANALYSIS_PROMPT.to_string(),
            turns: vec![ChatTurn::user(format!("Text: \"{text}\""))],
            json: true,
            temperature: 0.7,
            max_tokens: 200,
        };
        let raw = self.model.complete(&request)?;
        let payload = parse_json_object(&raw)?;
        snapshot_from_payload(&payload, self.model.name())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordHeuristicProvider;

impl EmotionProvider for KeywordHeuristicProvider {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn analyze(&self, text: &str) -> Result<EmotionSnapshot> {
        Ok(analyze_keywords(text))
    }
}

pub struct AnalysisStage {
    provider: Box<dyn EmotionProvider>,
    retry: RetryPolicy,
}

impl NamedProvider for AnalysisStage {
    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    pub snapshot: EmotionSnapshot,
    /// Stage that produced the snapshot; `None` for the neutral fallback.
    pub provider: Option<String>,
}

/// Ordered analysis stages. The first stage to produce a snapshot wins; when
/// every stage fails the neutral calm snapshot is returned.
pub struct EmotionCascade {
    stages: ProviderRegistry<AnalysisStage>,
    sleeper: Sleeper,
    events: EventLog,
}

impl EmotionCascade {
    pub fn new(sleeper: Sleeper, events: EventLog) -> Self {
        Self {
            stages: ProviderRegistry::default(),
            sleeper,
            events,
        }
    }

    pub fn with_stage<P>(mut self, provider: P, retry: RetryPolicy) -> Self
    where
        P: EmotionProvider + 'static,
    {
        self.stages.register(AnalysisStage {
            provider: Box::new(provider),
            retry,
        });
        self
    }

    /// Classifier (when a URL is set), then the active generative model;
    /// the keyword heuristic only stands in when no model is configured.
    pub fn from_config(
        config: &EngineConfig,
        language: Option<Arc<dyn LanguageModel>>,
        sleeper: Sleeper,
        events: EventLog,
    ) -> Self {
        let mut cascade = Self::new(sleeper.clone(), events);
        if let Some(url) = config.classifier_url.as_deref() {
            cascade = cascade.with_stage(
                ClassifierProvider::new(url, language.clone(), sleeper),
                RetryPolicy::single(),
            );
        }
        match language {
            Some(model) => cascade.with_stage(GenerativeAnalyzer::new(model), RetryPolicy::generative()),
            None => cascade.with_stage(KeywordHeuristicProvider, RetryPolicy::single()),
        }
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.names()
    }

    pub fn analyze(&self, text: &str) -> EmotionSnapshot {
        self.run(text, &self.events).snapshot
    }

    pub fn run(&self, text: &str, events: &EventLog) -> CascadeOutcome {
        for stage in self.stages.iter() {
            let name = stage.provider.name().to_string();
            let result = retry_on_rate_limit(
                stage.retry,
                &self.sleeper,
                |_| stage.provider.analyze(text),
                |attempt, delay, err| {
                    let mut payload = EventPayload::new();
                    payload.insert("provider".to_string(), json!(name));
                    payload.insert("attempt".to_string(), json!(attempt));
                    payload.insert("delay_ms".to_string(), json!(delay.as_millis() as u64));
                    payload.insert("error".to_string(), json!(error_chain_text(err, 300)));
                    events.record("analysis_rate_limited", payload);
                },
            );
            match result {
                Ok(snapshot) => {
                    record_completed(events, &name, &snapshot);
                    return CascadeOutcome {
                        snapshot,
                        provider: Some(name),
                    };
                }
                Err(err) => {
                    let mut payload = EventPayload::new();
                    payload.insert("provider".to_string(), json!(name));
                    payload.insert("rate_limited".to_string(), json!(is_rate_limited(&err)));
                    payload.insert("error".to_string(), json!(error_chain_text(&err, 300)));
                    events.record("analysis_stage_failed", payload);
                }
            }
        }

        let snapshot = EmotionSnapshot::neutral();
        record_completed(events, "neutral", &snapshot);
        CascadeOutcome {
            snapshot,
            provider: None,
        }
    }
}

fn record_completed(events: &EventLog, provider: &str, snapshot: &EmotionSnapshot) {
    let mut payload = EventPayload::new();
    payload.insert("provider".to_string(), json!(provider));
    payload.insert(
        "primary_emotion".to_string(),
        json!(snapshot.primary_emotion.as_str()),
    );
    payload.insert("intensity".to_string(), json!(snapshot.intensity));
    payload.insert("confidence".to_string(), json!(snapshot.confidence));
    events.record("analysis_completed", payload);
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{bail, Result};
    use echoscape_contracts::emotion::{EmotionSnapshot, PrimaryEmotion};
    use echoscape_contracts::events::EventLog;
    use serde_json::{json, Value};

    use super::testing::ScriptedModel;
    use super::{
        enrich, ClassifierProvider, EmotionCascade, EmotionProvider, GenerativeAnalyzer,
        KeywordHeuristicProvider,
    };
    use crate::config::EngineConfig;
    use crate::language::LanguageModel;
    use crate::retry::testing::{recording_sleeper, waits};
    use crate::retry::{RetryPolicy, Sleeper};

    struct Unreachable(&'static str);

    impl EmotionProvider for Unreachable {
        fn name(&self) -> &str {
            self.0
        }

        fn analyze(&self, _text: &str) -> Result<EmotionSnapshot> {
            bail!("{} connection refused", self.0)
        }
    }

    const JOY_JSON: &str = r#"{"primary_emotion": "joy", "secondary_emotion": "Excitement", "intensity": 0.8, "confidence": 0.95, "scene_metaphor": "a sunlit meadow"}"#;

    #[test]
    fn all_providers_unreachable_yields_neutral_calm() {
        let (sleeper, log) = recording_sleeper();
        let cascade = EmotionCascade::new(sleeper, EventLog::disabled())
            .with_stage(Unreachable("classifier"), RetryPolicy::single())
            .with_stage(Unreachable("openai"), RetryPolicy::generative());
        let outcome = cascade.run("Today was fine", &EventLog::disabled());
        assert_eq!(outcome.provider, None);
        assert_eq!(outcome.snapshot, EmotionSnapshot::neutral());
        assert_eq!(outcome.snapshot.primary_emotion, PrimaryEmotion::Calm);
        assert_eq!(outcome.snapshot.scene_metaphor, "A quiet, fog-covered lake");
        assert!(waits(&log).is_empty());
    }

    #[test]
    fn rate_limited_twice_then_success() {
        let (sleeper, log) = recording_sleeper();
        let model = Arc::new(ScriptedModel::new(
            "openai",
            vec![
                Err("OpenAI request failed (429): Rate limit reached"),
                Err("You exceeded your current quota"),
                Ok(JOY_JSON),
            ],
        ));
        let cascade = EmotionCascade::new(sleeper, EventLog::disabled())
            .with_stage(Unreachable("classifier"), RetryPolicy::single())
            .with_stage(GenerativeAnalyzer::new(model.clone()), RetryPolicy::generative());
        let outcome = cascade.run("I got the job!!", &EventLog::disabled());
        assert_eq!(outcome.provider.as_deref(), Some("openai"));
        assert_eq!(outcome.snapshot.primary_emotion, PrimaryEmotion::Joy);
        assert_eq!(outcome.snapshot.secondary_emotion.as_deref(), Some("excitement"));
        assert_eq!(model.calls(), 3);
        assert_eq!(
            waits(&log),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn permanent_failure_falls_through_without_waiting() {
        let (sleeper, log) = recording_sleeper();
        let model = Arc::new(ScriptedModel::new(
            "gemini",
            vec![Err("Gemini request failed (401): API key not valid")],
        ));
        let cascade = EmotionCascade::new(sleeper, EventLog::disabled())
            .with_stage(GenerativeAnalyzer::new(model.clone()), RetryPolicy::generative());
        let outcome = cascade.run("meh", &EventLog::disabled());
        assert_eq!(outcome.provider, None);
        assert_eq!(model.calls(), 1);
        assert!(waits(&log).is_empty());
    }

    #[test]
    fn unknown_label_counts_as_failure() {
        let model = Arc::new(ScriptedModel::new(
            "openai",
            vec![Ok(r#"{"primary_emotion": "nostalgia", "intensity": 0.4}"#)],
        ));
        let cascade = EmotionCascade::new(Sleeper::new(|_| {}), EventLog::disabled())
            .with_stage(GenerativeAnalyzer::new(model), RetryPolicy::generative())
            .with_stage(KeywordHeuristicProvider, RetryPolicy::single());
        let outcome = cascade.run("I am so happy", &EventLog::disabled());
        assert_eq!(outcome.provider.as_deref(), Some("heuristic"));
        assert_eq!(outcome.snapshot.primary_emotion, PrimaryEmotion::Joy);
    }

    #[test]
    fn classifier_result_is_enriched() -> anyhow::Result<()> {
        let (sleeper, log) = recording_sleeper();
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new(
            "openai",
            vec![
                Err("429 Too Many Requests"),
                Ok(r#"{"scene_metaphor": "a storm breaking over cliffs", "secondary_emotion": "overwhelm"}"#),
            ],
        ));
        let classifier = ClassifierProvider::new("http://127.0.0.1:9/", Some(model), sleeper);
        let payload = json!({"primary_emotion": "anger", "intensity": 0.7, "all_scores": []});
        let snapshot = classifier.snapshot_from_classifier(&payload, "Everything is broken")?;
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Anger);
        assert_eq!(snapshot.confidence, 0.9);
        assert_eq!(snapshot.intensity, 0.7);
        assert_eq!(snapshot.scene_metaphor, "a storm breaking over cliffs");
        assert_eq!(snapshot.secondary_emotion.as_deref(), Some("overwhelm"));
        assert_eq!(waits(&log), vec![Duration::from_millis(1500)]);

        let keeps_own = classifier.snapshot_from_classifier(
            &json!({"primary_emotion": "fear", "secondary_emotion": "dread", "intensity": 0.5}),
            "x",
        )?;
        assert_eq!(keeps_own.secondary_emotion.as_deref(), Some("dread"));
        assert_eq!(keeps_own.scene_metaphor, "A landscape representing fear");

        assert!(classifier
            .snapshot_from_classifier(&json!({"primary_emotion": "", "intensity": 0.5}), "x")
            .is_err());
        Ok(())
    }

    #[test]
    fn classifier_label_outside_vocabulary_folds_into_calm() -> anyhow::Result<()> {
        let classifier = ClassifierProvider::new("http://127.0.0.1:9", None, Sleeper::new(|_| {}));
        let snapshot = classifier.snapshot_from_classifier(
            &json!({"primary_emotion": "Surprise", "intensity": 0.6}),
            "I did not see that coming",
        )?;
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Calm);
        assert_eq!(snapshot.secondary_emotion.as_deref(), Some("surprise"));
        assert_eq!(snapshot.confidence, 0.9);
        assert_eq!(snapshot.intensity, 0.6);
        assert_eq!(snapshot.scene_metaphor, "A landscape representing surprise");

        let own_secondary = classifier.snapshot_from_classifier(
            &json!({"primary_emotion": "disgust", "secondary_emotion": "revulsion"}),
            "x",
        )?;
        assert_eq!(own_secondary.primary_emotion, PrimaryEmotion::Calm);
        assert_eq!(own_secondary.secondary_emotion.as_deref(), Some("revulsion"));
        Ok(())
    }

    #[test]
    fn enrichment_degrades_without_model() {
        let enrichment = enrich(
            None,
            "grief",
            "text",
            RetryPolicy::enrichment(),
            &Sleeper::new(|_| {}),
        );
        assert_eq!(enrichment.scene_metaphor, "A landscape representing grief");
        assert_eq!(enrichment.secondary_emotion.as_deref(), Some("uncertainty"));
    }

    #[test]
    fn config_decides_stage_order() {
        let offline = EmotionCascade::from_config(
            &EngineConfig::default(),
            None,
            Sleeper::new(|_| {}),
            EventLog::disabled(),
        );
        assert_eq!(offline.stage_names(), vec!["heuristic".to_string()]);
        let snapshot = offline.analyze("I feel so ANXIOUS and worried!");
        assert_eq!(snapshot.primary_emotion, PrimaryEmotion::Anxiety);

        let config = EngineConfig {
            classifier_url: Some("http://127.0.0.1:9".to_string()),
            ..EngineConfig::default()
        };
        let model: Arc<dyn LanguageModel> = Arc::new(ScriptedModel::new("gemini", Vec::new()));
        let online = EmotionCascade::from_config(
            &config,
            Some(model),
            Sleeper::new(|_| {}),
            EventLog::disabled(),
        );
        assert_eq!(
            online.stage_names(),
            vec!["classifier".to_string(), "gemini".to_string()]
        );
    }

    #[test]
    fn events_record_failures_and_completion() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let events = EventLog::new(&path, "session-1");
        let cascade = EmotionCascade::new(Sleeper::new(|_| {}), EventLog::disabled())
            .with_stage(Unreachable("classifier"), RetryPolicy::single())
            .with_stage(KeywordHeuristicProvider, RetryPolicy::single());
        cascade.run("I am scared", &events);

        let lines = std::fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], json!("analysis_stage_failed"));
        assert_eq!(lines[0]["provider"], json!("classifier"));
        assert_eq!(lines[1]["type"], json!("analysis_completed"));
        assert_eq!(lines[1]["primary_emotion"], json!("fear"));
        assert_eq!(lines[1]["session_id"], json!("session-1"));
        Ok(())
    }
}
