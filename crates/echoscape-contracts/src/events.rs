use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only structured log for `events.jsonl`.
///
/// - default fields are `type`, `session_id` (the scope), `ts`
/// - caller payload is merged last and can override defaults
/// - one compact JSON object per line
/// - a disabled log accepts every event and writes nothing
///
/// Clones (and scoped children) share the file handle lock, so lines from
/// one process never interleave.
#[derive(Debug, Clone)]
pub struct EventLog {
    sink: Option<Arc<EventSink>>,
    scope: String,
}

#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        Self {
            sink: Some(Arc::new(EventSink {
                path: path.into(),
                lock: Mutex::new(()),
            })),
            scope: scope.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            sink: None,
            scope: String::new(),
        }
    }

    /// Same sink, different scope (usually a session id).
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            scope: scope.into(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|sink| sink.path.as_path())
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert("session_id".to_string(), Value::String(self.scope.clone()));
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        let Some(sink) = self.sink.as_ref() else {
            return Ok(Value::Object(event));
        };
        if let Some(parent) = sink.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = sink
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }

    /// Best-effort variant for code paths that must not fail.
    pub fn record(&self, event_type: &str, payload: EventPayload) {
        let _ = self.emit(event_type, payload);
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
