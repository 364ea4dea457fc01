use std::time::Duration;

use anyhow::{bail, Context, Result};
use echoscape_contracts::events::{now_utc_iso, EventLog, EventPayload};
use echoscape_contracts::visual::{pick_fallback_image, ReframeMood, SceneDescriptor};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::FalSettings;
use crate::http::{error_chain_text, http_client, response_json_or_error};
use crate::retry::{poll_job, PollOutcome, PollPolicy, PollState, Sleeper};

pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "blurry, low quality, text, watermark, ugly, distorted, nsfw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Transient record of one queued generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub request_id: String,
    pub submitted_at: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Queued { request_id: String },
    Immediate { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
}

/// Queue-style image backend: submit, poll status, fetch result.
pub trait ImageJobProvider: Send + Sync {
    fn name(&self) -> &str;
    fn is_configured(&self) -> bool;
    fn submit(&self, request: &ImageRequest) -> Result<Submission>;
    fn status(&self, request_id: &str) -> Result<JobStatus>;
    fn result(&self, request_id: &str) -> Result<String>;
}

pub struct FalQueueProvider {
    settings: FalSettings,
    http: HttpClient,
}

impl FalQueueProvider {
    pub fn new(settings: FalSettings) -> Self {
        Self {
            settings,
            http: http_client(Duration::from_secs(30)),
        }
    }

    fn api_key(&self) -> Result<&str> {
        match self.settings.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("FAL_KEY (or FAL_API_KEY) not set"),
        }
    }

    fn model_url(&self) -> String {
        format!(
            "{}/{}",
            self.settings.queue_base,
            self.settings.model.trim_matches('/')
        )
    }

    fn get_json(&self, url: &str, label: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Key {}", self.api_key()?))
            .send()
            .with_context(|| format!("Fal {label} request failed ({url})"))?;
        response_json_or_error("Fal", response)
    }
}

pub fn first_image_url(value: &Value) -> Option<String> {
    let mut urls = Vec::new();
    extract_urls(value, &mut urls);
    urls.into_iter().next()
}

fn extract_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if trimmed.starts_with("http") && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                extract_urls(row, out);
            }
        }
        Value::Object(obj) => {
            for key in ["url", "images", "image", "output"] {
                if let Some(inner) = obj.get(key) {
                    extract_urls(inner, out);
                }
            }
        }
        _ => {}
    }
}

pub fn parse_queue_status(payload: &Value) -> JobStatus {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();
    match status.as_str() {
        "COMPLETED" => JobStatus::Completed,
        "FAILED" | "ERROR" | "CANCELLED" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

impl ImageJobProvider for FalQueueProvider {
    fn name(&self) -> &str {
        "fal"
    }

    fn is_configured(&self) -> bool {
        self.settings.api_key.is_some()
    }

    fn submit(&self, request: &ImageRequest) -> Result<Submission> {
        let endpoint = self.model_url();
        let payload = json!({
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "image_size": "landscape_16_9",
            "num_inference_steps": 25,
            "guidance_scale": 7.5,
        });
        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, format!("Key {}", self.api_key()?))
            .json(&payload)
            .send()
            .with_context(|| format!("Fal submit failed ({endpoint})"))?;
        let body = response_json_or_error("Fal", response)?;
        if let Some(request_id) = body
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Ok(Submission::Queued {
                request_id: request_id.to_string(),
            });
        }
        match first_image_url(&body) {
            Some(url) => Ok(Submission::Immediate { url }),
            None => bail!("Fal submit returned no request id or image"),
        }
    }

    fn status(&self, request_id: &str) -> Result<JobStatus> {
        let url = format!("{}/requests/{request_id}/status", self.model_url());
        Ok(parse_queue_status(&self.get_json(&url, "status")?))
    }

    fn result(&self, request_id: &str) -> Result<String> {
        let url = format!("{}/requests/{request_id}", self.model_url());
        let payload = self.get_json(&url, "result")?;
        match payload.pointer("/images/0/url").and_then(Value::as_str) {
            Some(url) => Ok(url.to_string()),
            None => first_image_url(&payload)
                .with_context(|| format!("Fal result for {request_id} had no image url")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub url: String,
    pub job: Option<GenerationJob>,
    /// Set whenever `url` is a curated fallback.
    pub fallback_reason: Option<String>,
}

/// Submit/poll driver around an [`ImageJobProvider`]. Never fails: every
/// problem ends in a curated landscape for the emotion hint.
pub struct ImageSynthesisClient {
    provider: Box<dyn ImageJobProvider>,
    poll: PollPolicy,
    sleeper: Sleeper,
    events: EventLog,
}

impl ImageSynthesisClient {
    pub fn new(
        provider: Box<dyn ImageJobProvider>,
        poll: PollPolicy,
        sleeper: Sleeper,
        events: EventLog,
    ) -> Self {
        Self {
            provider,
            poll,
            sleeper,
            events,
        }
    }

    pub fn fal(settings: FalSettings, sleeper: Sleeper, events: EventLog) -> Self {
        Self::new(
            Box::new(FalQueueProvider::new(settings)),
            PollPolicy::default(),
            sleeper,
            events,
        )
    }

    pub fn generate(&self, descriptor: &SceneDescriptor, emotion_hint: Option<&str>) -> String {
        self.generate_detailed(descriptor, emotion_hint, &self.events)
            .url
    }

    pub fn generate_detailed(
        &self,
        descriptor: &SceneDescriptor,
        emotion_hint: Option<&str>,
        events: &EventLog,
    ) -> ImageOutcome {
        let request = ImageRequest {
            prompt: descriptor.to_prompt(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
        };
        self.run(&request, emotion_hint, events)
    }

    pub fn reframe(&self, mood: &ReframeMood, emotion_hint: Option<&str>) -> String {
        self.reframe_detailed(mood, emotion_hint, &self.events).url
    }

    pub fn reframe_detailed(
        &self,
        mood: &ReframeMood,
        emotion_hint: Option<&str>,
        events: &EventLog,
    ) -> ImageOutcome {
        let request = ImageRequest {
            prompt: mood.to_prompt(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
        };
        self.run(&request, emotion_hint, events)
    }

    fn run(
        &self,
        request: &ImageRequest,
        emotion_hint: Option<&str>,
        events: &EventLog,
    ) -> ImageOutcome {
        let emotion = emotion_hint
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("calm");
        let fallback = |reason: String, job: Option<GenerationJob>| {
            let url = pick_fallback_image(emotion);
            let mut payload = EventPayload::new();
            payload.insert("provider".to_string(), json!(self.provider.name()));
            payload.insert("emotion".to_string(), json!(emotion));
            payload.insert("reason".to_string(), json!(reason));
            payload.insert("url".to_string(), json!(url));
            events.record("image_fallback", payload);
            ImageOutcome {
                url,
                job,
                fallback_reason: Some(reason),
            }
        };

        if !self.provider.is_configured() {
            return fallback(format!("{} credentials missing", self.provider.name()), None);
        }

        let request_id = match self.provider.submit(request) {
            Ok(Submission::Immediate { url }) => {
                let mut payload = EventPayload::new();
                payload.insert("provider".to_string(), json!(self.provider.name()));
                payload.insert("status".to_string(), json!(JobStatus::Completed.as_str()));
                payload.insert("immediate".to_string(), json!(true));
                events.record("image_job_finished", payload);
                return ImageOutcome {
                    url,
                    job: None,
                    fallback_reason: None,
                };
            }
            Ok(Submission::Queued { request_id }) => request_id,
            Err(err) => {
                let reason = format!("submit failed: {}", error_chain_text(&err, 300));
                return fallback(reason, None);
            }
        };

        let mut job = GenerationJob {
            request_id: request_id.clone(),
            submitted_at: now_utc_iso(),
            status: JobStatus::Pending,
        };
        let mut payload = EventPayload::new();
        payload.insert("provider".to_string(), json!(self.provider.name()));
        payload.insert("request_id".to_string(), json!(request_id));
        events.record("image_job_submitted", payload);

        let polled = poll_job(self.poll, &self.sleeper, |_| {
            Ok(match self.provider.status(&request_id)? {
                JobStatus::Completed => PollState::Completed,
                JobStatus::Failed => PollState::Failed,
                JobStatus::Pending | JobStatus::TimedOut => PollState::Pending,
            })
        });
        let result = match polled {
            Ok(PollOutcome::Completed) => self.provider.result(&request_id),
            Ok(PollOutcome::Failed) => {
                job.status = JobStatus::Failed;
                Err(anyhow::anyhow!("generation failed"))
            }
            Ok(PollOutcome::TimedOut) => {
                job.status = JobStatus::TimedOut;
                Err(anyhow::anyhow!("generation timed out"))
            }
            Err(err) => {
                job.status = JobStatus::Failed;
                Err(err.context("status poll failed"))
            }
        };
        let result = result.map(|url| {
            job.status = JobStatus::Completed;
            url
        });
        if result.is_err() && job.status == JobStatus::Pending {
            job.status = JobStatus::Failed;
        }

        let mut payload = EventPayload::new();
        payload.insert("provider".to_string(), json!(self.provider.name()));
        payload.insert("request_id".to_string(), json!(job.request_id));
        payload.insert("status".to_string(), json!(job.status.as_str()));
        events.record("image_job_finished", payload);

        match result {
            Ok(url) => ImageOutcome {
                url,
                job: Some(job),
                fallback_reason: None,
            },
            Err(err) => fallback(error_chain_text(&err, 300), Some(job)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, bail, Result};
    use echoscape_contracts::emotion::EmotionVector;
    use echoscape_contracts::events::EventLog;
    use echoscape_contracts::visual::{
        build_scene_descriptor, curated_images, map_to_visual_params, ReframeMood,
    };
    use serde_json::json;

    use super::{
        first_image_url, parse_queue_status, ImageJobProvider, ImageRequest,
        ImageSynthesisClient, JobStatus, Submission,
    };
    use crate::retry::testing::{recording_sleeper, waits};
    use crate::retry::PollPolicy;

    struct StubQueue {
        configured: bool,
        submission: Result<Submission, String>,
        statuses: Mutex<VecDeque<Result<JobStatus, String>>>,
        result: Result<String, String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl StubQueue {
        fn queued(statuses: Vec<Result<JobStatus, String>>) -> Self {
            Self {
                configured: true,
                submission: Ok(Submission::Queued {
                    request_id: "req-1".to_string(),
                }),
                statuses: Mutex::new(statuses.into_iter().collect()),
                result: Ok("https://fal.media/files/landscape.png".to_string()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ImageJobProvider for StubQueue {
        fn name(&self) -> &str {
            "stub"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn submit(&self, request: &ImageRequest) -> Result<Submission> {
            if let Ok(mut guard) = self.prompts.lock() {
                guard.push(request.prompt.clone());
            }
            self.submission.clone().map_err(|message| anyhow!(message))
        }

        fn status(&self, _request_id: &str) -> Result<JobStatus> {
            let next = self
                .statuses
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .pop_front();
            match next {
                Some(Ok(status)) => Ok(status),
                Some(Err(message)) => bail!(message),
                None => Ok(JobStatus::Pending),
            }
        }

        fn result(&self, _request_id: &str) -> Result<String> {
            self.result.clone().map_err(|message| anyhow!(message))
        }
    }

    fn build_client(stub: StubQueue) -> (ImageSynthesisClient, Arc<Mutex<Vec<Duration>>>) {
        let (sleeper, log) = recording_sleeper();
        (
            ImageSynthesisClient::new(
                Box::new(stub),
                PollPolicy::default(),
                sleeper,
                EventLog::disabled(),
            ),
            log,
        )
    }

    fn sad_descriptor() -> echoscape_contracts::visual::SceneDescriptor {
        let vector: EmotionVector = [("sadness".to_string(), 0.6)].into_iter().collect();
        let params = map_to_visual_params(&vector);
        build_scene_descriptor(&params, "a grey sea")
    }

    #[test]
    fn completed_job_returns_provider_url() {
        let (client, log) = build_client(StubQueue::queued(vec![
            Ok(JobStatus::Pending),
            Ok(JobStatus::Completed),
        ]));
        let outcome = client.generate_detailed(&sad_descriptor(), Some("sadness"), &EventLog::disabled());
        assert_eq!(outcome.url, "https://fal.media/files/landscape.png");
        assert!(outcome.fallback_reason.is_none());
        let job = outcome.job.unwrap_or_else(|| panic!("job expected"));
        assert_eq!(job.request_id, "req-1");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(waits(&log).len(), 2);
    }

    #[test]
    fn failed_job_uses_curated_fallback() {
        let (client, _) = build_client(StubQueue::queued(vec![Ok(JobStatus::Failed)]));
        let outcome = client.generate_detailed(&sad_descriptor(), Some("sadness"), &EventLog::disabled());
        assert!(curated_images("sadness").contains(&outcome.url));
        assert_eq!(outcome.job.map(|job| job.status), Some(JobStatus::Failed));
    }

    #[test]
    fn never_completing_job_times_out_to_fallback() {
        let (client, log) = build_client(StubQueue::queued(Vec::new()));
        let outcome = client.generate_detailed(&sad_descriptor(), Some("grief"), &EventLog::disabled());
        assert!(curated_images("grief").contains(&outcome.url));
        assert_eq!(outcome.job.map(|job| job.status), Some(JobStatus::TimedOut));
        assert_eq!(waits(&log), vec![Duration::from_secs(1); 20]);
    }

    #[test]
    fn poll_error_and_result_error_fall_back() {
        let (client, _) = build_client(StubQueue::queued(vec![Err("502 bad gateway".to_string())]));
        let url = client.generate(&sad_descriptor(), Some("fear"));
        assert!(curated_images("fear").contains(&url));

        let mut stub = StubQueue::queued(vec![Ok(JobStatus::Completed)]);
        stub.result = Err("no images".to_string());
        let (client, _) = build_client(stub);
        let outcome = client.generate_detailed(&sad_descriptor(), None, &EventLog::disabled());
        assert!(curated_images("calm").contains(&outcome.url));
        assert_eq!(outcome.job.map(|job| job.status), Some(JobStatus::Failed));
    }

    #[test]
    fn immediate_submission_is_completed() {
        let mut stub = StubQueue::queued(Vec::new());
        stub.submission = Ok(Submission::Immediate {
            url: "https://fal.media/direct.png".to_string(),
        });
        let (client, log) = build_client(stub);
        let outcome = client.generate_detailed(&sad_descriptor(), Some("sadness"), &EventLog::disabled());
        assert_eq!(outcome.url, "https://fal.media/direct.png");
        assert!(outcome.job.is_none());
        assert!(waits(&log).is_empty());
    }

    #[test]
    fn missing_credentials_or_submit_error_fall_back() {
        let mut stub = StubQueue::queued(Vec::new());
        stub.configured = false;
        let (client, log) = build_client(stub);
        let outcome = client.generate_detailed(&sad_descriptor(), Some("joy"), &EventLog::disabled());
        assert!(curated_images("joy").contains(&outcome.url));
        assert_eq!(outcome.fallback_reason.as_deref(), Some("stub credentials missing"));
        assert!(waits(&log).is_empty());

        let mut stub = StubQueue::queued(Vec::new());
        stub.submission = Err("connection refused".to_string());
        let (client, _) = build_client(stub);
        let url = client.generate(&sad_descriptor(), Some("not-an-emotion"));
        assert!(curated_images("calm").contains(&url));
    }

    #[test]
    fn prompts_come_from_descriptor_and_mood() -> Result<()> {
        let stub = StubQueue::queued(vec![Ok(JobStatus::Completed), Ok(JobStatus::Completed)]);
        let prompts = Arc::clone(&stub.prompts);
        let (client, _) = build_client(stub);

        let descriptor = sad_descriptor();
        client.generate(&descriptor, Some("sadness"));
        let url = client.reframe(&ReframeMood::new(0.9, 0.1), Some("hope"));
        assert_eq!(url, "https://fal.media/files/landscape.png");

        let seen = prompts.lock().map_err(|_| anyhow!("poisoned"))?.clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], descriptor.to_prompt());
        assert!(seen[0].contains("a grey sea"));
        assert!(seen[1].starts_with("A landscape transformation, hopeful, bright, divine light"));
        Ok(())
    }

    #[test]
    fn queue_payload_helpers() {
        assert_eq!(parse_queue_status(&json!({"status": "IN_QUEUE"})), JobStatus::Pending);
        assert_eq!(parse_queue_status(&json!({"status": "IN_PROGRESS"})), JobStatus::Pending);
        assert_eq!(parse_queue_status(&json!({"status": "COMPLETED"})), JobStatus::Completed);
        assert_eq!(parse_queue_status(&json!({"status": "FAILED"})), JobStatus::Failed);
        assert_eq!(
            first_image_url(&json!({"images": [{"url": "https://a/1.png"}, {"url": "https://a/2.png"}]})),
            Some("https://a/1.png".to_string())
        );
        assert_eq!(first_image_url(&json!({"images": []})), None);
    }
}
