use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crisis::CrisisResult;
use crate::events::now_utc_iso;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisRecord {
    pub ts: String,
    pub session_id: String,
    pub trigger_text: String,
    pub risk_score: f64,
    pub detected_keywords: Vec<String>,
    pub resources_shown: bool,
}

/// Append-only `crisis_log.jsonl`.
#[derive(Debug, Clone)]
pub struct CrisisLog {
    path: PathBuf,
}

impl CrisisLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(
        &self,
        session_id: &str,
        trigger_text: &str,
        result: &CrisisResult,
    ) -> anyhow::Result<CrisisRecord> {
        let record = CrisisRecord {
            ts: now_utc_iso(),
            session_id: session_id.to_string(),
            trigger_text: trigger_text.to_string(),
            risk_score: result.risk_score,
            detected_keywords: result.detected_keywords.clone(),
            resources_shown: true,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(serde_json::to_string(&record)?.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(record)
    }

    pub fn read_all(&self) -> anyhow::Result<Vec<CrisisRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::CrisisLog;
    use crate::crisis::evaluate;

    #[test]
    fn crisis_log_appends_jsonl_record() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("crisis_log.jsonl");
        let log = CrisisLog::new(&path);

        let result = evaluate("I want to kill myself");
        let record = log.record("session-1", "I want to kill myself", &result)?;
        assert_eq!(record.risk_score, 0.9);
        assert!(record.resources_shown);
        log.record("session-1", "again", &result)?;

        let raw = std::fs::read_to_string(&path)?;
        let first: Value = serde_json::from_str(raw.lines().next().unwrap_or(""))?;
        assert_eq!(first["session_id"], Value::String("session-1".to_string()));
        assert_eq!(first["detected_keywords"][0], Value::String("kill myself".to_string()));
        assert_eq!(log.read_all()?.len(), 2);
        Ok(())
    }

    #[test]
    fn missing_file_reads_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = CrisisLog::new(temp.path().join("none.jsonl"));
        assert!(log.read_all()?.is_empty());
        Ok(())
    }
}
