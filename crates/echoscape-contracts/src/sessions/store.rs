use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emotion::{EmotionSnapshot, EmotionVector};
use crate::events::now_utc_iso;
use crate::visual::{ReframeMood, SceneDescriptor, VisualParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub metaphor: Option<String>,
    #[serde(default)]
    pub primary_emotion: Option<String>,
    #[serde(default)]
    pub emotion_vector: Option<EmotionVector>,
    #[serde(default)]
    pub visual_params: Option<VisualParameters>,
    #[serde(default)]
    pub original_image_url: Option<String>,
    #[serde(default)]
    pub reframed_image_url: Option<String>,
    #[serde(default)]
    pub reframe_mood: Option<ReframeMood>,
    #[serde(default)]
    pub crisis_detected: bool,
}

impl Session {
    fn new(id: String) -> Self {
        let now = now_utc_iso();
        Self {
            id,
            created_at: now.clone(),
            updated_at: now,
            ended_at: None,
            summary: None,
            themes: Vec::new(),
            metaphor: None,
            primary_emotion: None,
            emotion_vector: None,
            visual_params: None,
            original_image_url: None,
            reframed_image_url: None,
            reframe_mood: None,
            crisis_detected: false,
        }
    }

    fn apply(&mut self, patch: SessionPatch) {
        macro_rules! set {
            ($($field:ident),+) => {
                $(if let Some(value) = patch.$field {
                    self.$field = Some(value);
                })+
            };
        }
        set!(
            ended_at,
            summary,
            metaphor,
            primary_emotion,
            emotion_vector,
            visual_params,
            original_image_url,
            reframed_image_url,
            reframe_mood
        );
        if let Some(themes) = patch.themes {
            self.themes = themes;
        }
        if let Some(crisis) = patch.crisis_detected {
            self.crisis_detected = crisis;
        }
        self.updated_at = now_utc_iso();
    }
}

/// Partial session update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub ended_at: Option<String>,
    pub summary: Option<String>,
    pub themes: Option<Vec<String>>,
    pub metaphor: Option<String>,
    pub primary_emotion: Option<String>,
    pub emotion_vector: Option<EmotionVector>,
    pub visual_params: Option<VisualParameters>,
    pub original_image_url: Option<String>,
    pub reframed_image_url: Option<String>,
    pub reframe_mood: Option<ReframeMood>,
    pub crisis_detected: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub emotion_snapshot: Option<EmotionSnapshot>,
    #[serde(default)]
    pub patterns_detected: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Base,
    Reframed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    pub id: String,
    pub session_id: String,
    pub kind: VisualKind,
    pub image_url: String,
    #[serde(default)]
    pub variant_name: Option<String>,
    #[serde(default)]
    pub base_visual_id: Option<String>,
    #[serde(default)]
    pub deltas: BTreeMap<String, f64>,
    pub visual_params: VisualParameters,
    pub descriptor: SceneDescriptor,
    pub fingerprint: String,
    pub generated_at: String,
}

/// Narrow persistence interface the pipeline calls into. Lookups that miss
/// return `Ok(None)`; only storage failures are errors.
pub trait SessionStore {
    fn create_session(&mut self) -> Result<Session>;

    fn get_session(&self, id: &str) -> Result<Option<Session>>;

    /// Newest first, `offset` sessions skipped, at most `limit` returned.
    fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<Session>>;

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>>;

    fn append_message(
        &mut self,
        session_id: &str,
        role: Role,
        content: &str,
        snapshot: Option<EmotionSnapshot>,
        patterns: Vec<String>,
    ) -> Result<Option<Message>>;

    fn list_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    fn save_visual(&mut self, visual: Visual) -> Result<Visual>;

    fn list_visuals(&self, session_id: &str) -> Result<Vec<Visual>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    sessions: IndexMap<String, Session>,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    visuals: Vec<Visual>,
}

impl SessionDocument {
    fn create_session(&mut self) -> Session {
        let session = Session::new(Uuid::new_v4().to_string());
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    fn list_sessions(&self, limit: usize, offset: usize) -> Vec<Session> {
        self.sessions
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Option<Session> {
        let session = self.sessions.get_mut(id)?;
        session.apply(patch);
        Some(session.clone())
    }

    fn append_message(
        &mut self,
        session_id: &str,
        role: Role,
        content: &str,
        snapshot: Option<EmotionSnapshot>,
        patterns: Vec<String>,
    ) -> Option<Message> {
        if !self.sessions.contains_key(session_id) {
            return None;
        }
        let message = Message {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            emotion_snapshot: snapshot,
            patterns_detected: patterns,
            created_at: now_utc_iso(),
        };
        self.messages.push(message.clone());
        Some(message)
    }

    fn list_messages(&self, session_id: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect()
    }

    fn list_visuals(&self, session_id: &str) -> Vec<Visual> {
        self.visuals
            .iter()
            .filter(|visual| visual.session_id == session_id)
            .cloned()
            .collect()
    }
}

/// In-process store, lost on drop.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    document: SessionDocument,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&mut self) -> Result<Session> {
        Ok(self.document.create_session())
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.document.sessions.get(id).cloned())
    }

    fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<Session>> {
        Ok(self.document.list_sessions(limit, offset))
    }

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        Ok(self.document.update_session(id, patch))
    }

    fn append_message(
        &mut self,
        session_id: &str,
        role: Role,
        content: &str,
        snapshot: Option<EmotionSnapshot>,
        patterns: Vec<String>,
    ) -> Result<Option<Message>> {
        Ok(self
            .document
            .append_message(session_id, role, content, snapshot, patterns))
    }

    fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.document.list_messages(session_id))
    }

    fn save_visual(&mut self, visual: Visual) -> Result<Visual> {
        self.document.visuals.push(visual.clone());
        Ok(visual)
    }

    fn list_visuals(&self, session_id: &str) -> Result<Vec<Visual>> {
        Ok(self.document.list_visuals(session_id))
    }
}

/// Single pretty-printed JSON document on disk, rewritten after every
/// mutation.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
    document: SessionDocument,
}

impl FileSessionStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read session store {}", path.display()))?;
            if raw.trim().is_empty() {
                SessionDocument::default()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid session store {}", path.display()))?
            }
        } else {
            SessionDocument::default()
        };
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the document and keeps it only once the
    /// copy is on disk. `None` from `change` leaves everything untouched.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut SessionDocument) -> Option<T>,
    ) -> Result<Option<T>> {
        let mut next = self.document.clone();
        let Some(value) = change(&mut next) else {
            return Ok(None);
        };
        write_document(&self.path, &next)?;
        self.document = next;
        Ok(Some(value))
    }
}

fn write_document(path: &Path, document: &SessionDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(document)?)
        .with_context(|| format!("failed to write session store {}", path.display()))?;
    Ok(())
}

impl SessionStore for FileSessionStore {
    fn create_session(&mut self) -> Result<Session> {
        self.commit(|document| Some(document.create_session()))?
            .context("session store refused to create a session")
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.document.sessions.get(id).cloned())
    }

    fn list_sessions(&self, limit: usize, offset: usize) -> Result<Vec<Session>> {
        Ok(self.document.list_sessions(limit, offset))
    }

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        self.commit(|document| document.update_session(id, patch))
    }

    fn append_message(
        &mut self,
        session_id: &str,
        role: Role,
        content: &str,
        snapshot: Option<EmotionSnapshot>,
        patterns: Vec<String>,
    ) -> Result<Option<Message>> {
        self.commit(|document| {
            document.append_message(session_id, role, content, snapshot, patterns)
        })
    }

    fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.document.list_messages(session_id))
    }

    fn save_visual(&mut self, visual: Visual) -> Result<Visual> {
        self.commit(|document| {
            document.visuals.push(visual.clone());
            Some(visual)
        })?
        .context("session store refused to save a visual")
    }

    fn list_visuals(&self, session_id: &str) -> Result<Vec<Visual>> {
        Ok(self.document.list_visuals(session_id))
    }
}
