pub mod analysis;
pub mod coach;
pub mod config;
pub mod http;
pub mod image;
pub mod language;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use echoscape_contracts::crisis::{self, CrisisResult, CRISIS_SAFETY_MESSAGE};
use echoscape_contracts::emotion::{aggregate, EmotionSnapshot, EmotionVector};
use echoscape_contracts::events::{now_utc_iso, EventLog, EventPayload};
use echoscape_contracts::sessions::{
    build_summary, CrisisLog, Message, Role, SessionPatch, SessionStore, SessionSummary, Visual,
    VisualKind,
};
use echoscape_contracts::visual::{
    apply_deltas, build_scene_descriptor, map_to_visual_params, ReframeMood, VisualParameters,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::analysis::EmotionCascade;
use crate::coach::Coach;
use crate::config::EngineConfig;
use crate::image::ImageSynthesisClient;
use crate::language::{language_model_for, LanguageModel};
use crate::retry::Sleeper;

pub const BASE_VISUAL_METAPHOR: &str = "A moment of reflection and self-discovery";
pub const REFRAME_METAPHOR: &str = "A moment of reflection";
const HOPE_SUFFIX: &str = " with a sense of hope emerging";
const OPENNESS_SUFFIX: &str = ", expanding into possibility";

#[derive(Debug, Clone)]
pub struct ProcessedMessage {
    pub user_message: Message,
    pub assistant_message: Message,
    pub snapshot: EmotionSnapshot,
    /// Cascade stage that produced the snapshot; `None` for the neutral fallback.
    pub analysis_provider: Option<String>,
    pub crisis: CrisisResult,
    pub visual_params: VisualParameters,
    pub image_url: String,
    pub image_fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MoodReframe {
    pub session_id: String,
    pub mood: ReframeMood,
    pub image_url: String,
}

/// One journaling pipeline over a session store. Every step except storage
/// degrades instead of failing.
pub struct EchoEngine<S: SessionStore> {
    store: S,
    cascade: EmotionCascade,
    images: ImageSynthesisClient,
    coach: Coach,
    events: EventLog,
    crisis_log: Option<CrisisLog>,
}

impl<S: SessionStore> EchoEngine<S> {
    pub fn from_config(store: S, config: &EngineConfig) -> Self {
        let events = match config.events_path.as_ref() {
            Some(path) => EventLog::new(path, "engine"),
            None => EventLog::disabled(),
        };
        let language: Option<Arc<dyn LanguageModel>> = config
            .active_backend()
            .map(|(backend, endpoint)| language_model_for(backend, endpoint));
        let sleeper = Sleeper::thread();
        let cascade =
            EmotionCascade::from_config(config, language.clone(), sleeper.clone(), events.clone());
        let images = ImageSynthesisClient::fal(config.fal.clone(), sleeper.clone(), events.clone());
        let coach = Coach::new(language, sleeper);
        Self::with_parts(store, cascade, images, coach, events)
    }

    pub fn with_parts(
        store: S,
        cascade: EmotionCascade,
        images: ImageSynthesisClient,
        coach: Coach,
        events: EventLog,
    ) -> Self {
        Self {
            store,
            cascade,
            images,
            coach,
            events,
            crisis_log: None,
        }
    }

    pub fn with_crisis_log(mut self, log: CrisisLog) -> Self {
        self.crisis_log = Some(log);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn cascade(&self) -> &EmotionCascade {
        &self.cascade
    }

    pub fn coach(&self) -> &Coach {
        &self.coach
    }

    /// Crisis gate, analysis, visual, reply. `Ok(None)` when the session
    /// does not exist.
    pub fn process_message(
        &mut self,
        session_id: &str,
        text: &str,
    ) -> Result<Option<ProcessedMessage>> {
        if self.store.get_session(session_id)?.is_none() {
            return Ok(None);
        }
        let events = self.events.scoped(session_id);

        let crisis = crisis::evaluate(text);
        events.record(
            "crisis_checked",
            map_object(json!({
                "is_crisis": crisis.is_crisis,
                "risk_score": crisis.risk_score,
                "detected_keywords": crisis.detected_keywords,
            })),
        );
        if crisis.is_crisis {
            self.log_crisis(session_id, text, &crisis, &events);
        }

        let analysis = self.cascade.run(text, &events);
        let snapshot = analysis.snapshot;
        let vector = snapshot.to_vector();
        let visual_params = map_to_visual_params(&vector);
        record_visual_mapped(&events, &vector, &visual_params);

        let metaphor = snapshot.metaphor_or_default();
        let descriptor = build_scene_descriptor(&visual_params, &metaphor);
        let image = self.images.generate_detailed(
            &descriptor,
            Some(snapshot.primary_emotion.as_str()),
            &events,
        );

        self.store.update_session(
            session_id,
            SessionPatch {
                original_image_url: Some(image.url.clone()),
                visual_params: Some(visual_params.clone()),
                crisis_detected: crisis.is_crisis.then_some(true),
                ..SessionPatch::default()
            },
        )?;

        let history = self.store.list_messages(session_id)?;
        let user_message = self
            .store
            .append_message(
                session_id,
                Role::User,
                text,
                Some(snapshot.clone()),
                crisis.detected_keywords.clone(),
            )?
            .with_context(|| format!("session {session_id} disappeared while saving message"))?;

        let reply = if crisis.is_crisis {
            CRISIS_SAFETY_MESSAGE.to_string()
        } else {
            self.coach.reply(&history, text, &events)
        };
        let assistant_message = self
            .store
            .append_message(session_id, Role::Assistant, &reply, None, Vec::new())?
            .with_context(|| format!("session {session_id} disappeared while saving reply"))?;

        Ok(Some(ProcessedMessage {
            user_message,
            assistant_message,
            snapshot,
            analysis_provider: analysis.provider,
            crisis,
            visual_params,
            image_url: image.url,
            image_fallback_reason: image.fallback_reason,
        }))
    }

    fn log_crisis(&self, session_id: &str, text: &str, crisis: &CrisisResult, events: &EventLog) {
        let Some(log) = self.crisis_log.as_ref() else {
            return;
        };
        match log.record(session_id, text, crisis) {
            Ok(record) => events.record(
                "crisis_logged",
                map_object(json!({
                    "path": log.path().to_string_lossy(),
                    "detected_keywords": record.detected_keywords,
                })),
            ),
            Err(err) => events.record(
                "crisis_log_failed",
                map_object(json!({ "error": format!("{err:#}") })),
            ),
        }
    }

    /// Base visual from the session's stored vector, or the aggregate of its
    /// user messages.
    pub fn generate_visual(&mut self, session_id: &str) -> Result<Option<Visual>> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Ok(None);
        };
        let events = self.events.scoped(session_id);
        let vector = match session.emotion_vector.filter(|vector| !vector.is_empty()) {
            Some(vector) => vector,
            None => user_vector(&self.store.list_messages(session_id)?),
        };
        let visual_params = map_to_visual_params(&vector);
        record_visual_mapped(&events, &vector, &visual_params);

        let metaphor = session
            .metaphor
            .unwrap_or_else(|| BASE_VISUAL_METAPHOR.to_string());
        let descriptor = build_scene_descriptor(&visual_params, &metaphor);
        let image = self.images.generate_detailed(
            &descriptor,
            Some(visual_params.emotion.as_str()),
            &events,
        );

        let visual = self.store.save_visual(Visual {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: VisualKind::Base,
            image_url: image.url,
            variant_name: None,
            base_visual_id: None,
            deltas: BTreeMap::new(),
            fingerprint: descriptor.fingerprint(),
            visual_params,
            descriptor,
            generated_at: now_utc_iso(),
        })?;
        self.store.update_session(
            session_id,
            SessionPatch {
                original_image_url: Some(visual.image_url.clone()),
                visual_params: Some(visual.visual_params.clone()),
                ..SessionPatch::default()
            },
        )?;
        Ok(Some(visual))
    }

    /// Variant of a base visual with deltas applied. Without an explicit id
    /// the latest base visual is used.
    pub fn reframe_visual(
        &mut self,
        session_id: &str,
        deltas: &BTreeMap<String, f64>,
        base_visual_id: Option<&str>,
        variant_name: Option<&str>,
    ) -> Result<Option<Visual>> {
        if deltas.is_empty() {
            bail!("reframe needs at least one parameter delta");
        }
        let Some(session) = self.store.get_session(session_id)? else {
            return Ok(None);
        };
        let events = self.events.scoped(session_id);
        let visuals = self.store.list_visuals(session_id)?;
        let base = match base_visual_id {
            Some(id) => visuals.iter().find(|visual| visual.id == id),
            None => visuals
                .iter()
                .rev()
                .find(|visual| visual.kind == VisualKind::Base),
        };
        let Some(base) = base else {
            bail!("no base visual found for session {session_id}; generate one first");
        };

        let visual_params = apply_deltas(&base.visual_params, deltas);
        let metaphor = reframe_metaphor(session.metaphor.as_deref(), deltas);
        let descriptor = build_scene_descriptor(&visual_params, &metaphor);
        let image = self.images.generate_detailed(
            &descriptor,
            Some(visual_params.emotion.as_str()),
            &events,
        );

        let visual = self.store.save_visual(Visual {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: VisualKind::Reframed,
            image_url: image.url,
            variant_name: variant_name.map(str::to_string),
            base_visual_id: Some(base.id.clone()),
            deltas: deltas.clone(),
            fingerprint: descriptor.fingerprint(),
            visual_params,
            descriptor,
            generated_at: now_utc_iso(),
        })?;
        self.store.update_session(
            session_id,
            SessionPatch {
                reframed_image_url: Some(visual.image_url.clone()),
                ..SessionPatch::default()
            },
        )?;
        Ok(Some(visual))
    }

    pub fn reframe_mood(
        &mut self,
        session_id: &str,
        hope_level: f64,
        intensity_level: f64,
    ) -> Result<Option<MoodReframe>> {
        let Some(session) = self.store.get_session(session_id)? else {
            return Ok(None);
        };
        let events = self.events.scoped(session_id);
        let mood = ReframeMood::new(hope_level, intensity_level);
        let hint = session.primary_emotion.as_deref().or_else(|| {
            session
                .visual_params
                .as_ref()
                .map(|params| params.emotion.as_str())
        });
        let image = self.images.reframe_detailed(&mood, hint, &events);
        self.store.update_session(
            session_id,
            SessionPatch {
                reframed_image_url: Some(image.url.clone()),
                reframe_mood: Some(mood),
                ..SessionPatch::default()
            },
        )?;
        Ok(Some(MoodReframe {
            session_id: session_id.to_string(),
            mood,
            image_url: image.url,
        }))
    }

    /// Closes a session: themes, aggregate vector and primary emotion are
    /// written back. A session can only be summarized once.
    pub fn summarize_session(&mut self, session_id: &str) -> Result<SessionSummary> {
        let Some(session) = self.store.get_session(session_id)? else {
            bail!("session not found: {session_id}");
        };
        if session.ended_at.is_some() {
            bail!("session {session_id} has already ended");
        }
        let messages = self.store.list_messages(session_id)?;
        if messages.is_empty() {
            bail!("session {session_id} has no messages to summarize");
        }

        let summary = build_summary(session_id, &messages);
        self.store.update_session(
            session_id,
            SessionPatch {
                ended_at: Some(summary.ended_at.clone()),
                summary: Some(summary.summary.clone()),
                themes: Some(summary.themes.clone()),
                metaphor: session
                    .metaphor
                    .is_none()
                    .then(|| summary.metaphor.clone()),
                primary_emotion: Some(summary.primary_emotion.clone()),
                emotion_vector: Some(summary.emotion_vector.clone()),
                ..SessionPatch::default()
            },
        )?;
        self.events.scoped(session_id).record(
            "session_summarized",
            map_object(json!({
                "message_count": summary.message_count,
                "themes": summary.themes,
                "primary_emotion": summary.primary_emotion,
            })),
        );
        Ok(summary)
    }
}

fn user_vector(messages: &[Message]) -> EmotionVector {
    let snapshots = messages
        .iter()
        .filter(|message| message.role == Role::User)
        .filter_map(|message| message.emotion_snapshot.clone())
        .collect::<Vec<_>>();
    aggregate(&snapshots)
}

fn reframe_metaphor(base: Option<&str>, deltas: &BTreeMap<String, f64>) -> String {
    let positive = |key: &str| deltas.get(key).is_some_and(|value| *value > 0.0);
    let mut metaphor = base.unwrap_or(REFRAME_METAPHOR).to_string();
    if positive("light_level") || positive("warmth") {
        metaphor.push_str(HOPE_SUFFIX);
    }
    if positive("openness") {
        metaphor.push_str(OPENNESS_SUFFIX);
    }
    metaphor
}

fn record_visual_mapped(events: &EventLog, vector: &EmotionVector, params: &VisualParameters) {
    events.record(
        "visual_mapped",
        map_object(json!({
            "emotion_vector": vector,
            "emotion": params.emotion,
            "scene_type": params.scene_type.as_str(),
            "color_palette": params.color_palette.as_str(),
            "camera_angle": params.camera_angle.as_str(),
            "light_level": params.light_level,
            "openness": params.openness,
            "contrast": params.contrast,
        })),
    );
}

fn map_object(value: Value) -> EventPayload {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
