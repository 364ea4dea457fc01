use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::{GenerativeBackend, ModelEndpoint};
use crate::http::{http_client, response_json_or_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub turns: Vec<ChatTurn>,
    /// Ask the provider for a JSON object body.
    pub json: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A hosted text model. One call, no retries; callers own the retry policy.
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub struct OpenAiModel {
    endpoint: ModelEndpoint,
    http: HttpClient,
}

impl OpenAiModel {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            endpoint,
            http: http_client(Duration::from_secs(60)),
        }
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system })];
        for turn in &request.turns {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }
        let mut payload = json!({
            "model": self.endpoint.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        payload
    }
}

impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.endpoint.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.endpoint.api_key)
            .json(&self.payload(request))
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let payload = response_json_or_error("OpenAI", response)?;
        openai_content(&payload)
    }
}

fn openai_content(payload: &Value) -> Result<String> {
    let choice = payload.pointer("/choices/0");
    if choice
        .and_then(|row| row.get("finish_reason"))
        .and_then(Value::as_str)
        == Some("content_filter")
    {
        bail!("OpenAI response withheld by content_policy filter");
    }
    let Some(content) = choice
        .and_then(|row| row.pointer("/message/content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        bail!("OpenAI response had no content");
    };
    Ok(content.to_string())
}

/// Keeps the key out of the URL, which `reqwest` errors print verbatim.
const GOOGLE_API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiModel {
    endpoint: ModelEndpoint,
    http: HttpClient,
}

impl GeminiModel {
    pub fn new(endpoint: ModelEndpoint) -> Self {
        Self {
            endpoint,
            http: http_client(Duration::from_secs(60)),
        }
    }

    fn endpoint_for_model(&self) -> String {
        let trimmed = self.endpoint.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.endpoint.api_base, model_path)
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let contents = request
            .turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": turn.content }] })
            })
            .collect::<Vec<_>>();
        let mut generation_config = json!({
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
        });
        if request.json {
            generation_config["responseMimeType"] = json!("application/json");
        }
        json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": contents,
            "generationConfig": generation_config,
        })
    }
}

impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let endpoint = self.endpoint_for_model();
        let response = self
            .http
            .post(&endpoint)
            .header(GOOGLE_API_KEY_HEADER, self.endpoint.api_key.as_str())
            .json(&self.payload(request))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("Gemini", response)?;
        gemini_content(&payload)
    }
}

fn gemini_content(payload: &Value) -> Result<String> {
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        bail!("Gemini blocked the prompt for safety ({reason})");
    }
    let candidate = payload.pointer("/candidates/0");
    if candidate
        .and_then(|row| row.get("finishReason"))
        .and_then(Value::as_str)
        == Some("SAFETY")
    {
        bail!("Gemini stopped the response for safety");
    }
    let text = candidate
        .and_then(|row| row.pointer("/content/parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        bail!("Gemini response had no text");
    }
    Ok(text.to_string())
}

pub fn language_model_for(
    backend: GenerativeBackend,
    endpoint: &ModelEndpoint,
) -> Arc<dyn LanguageModel> {
    match backend {
        GenerativeBackend::OpenAi => Arc::new(OpenAiModel::new(endpoint.clone())),
        GenerativeBackend::Gemini => Arc::new(GeminiModel::new(endpoint.clone())),
    }
}

/// Parses a model's JSON answer, tolerating a surrounding markdown fence.
pub fn parse_json_object(text: &str) -> Result<Value> {
    let body = strip_code_fence(text);
    let parsed: Value =
        serde_json::from_str(body).context("model returned malformed JSON")?;
    if !parsed.is_object() {
        bail!("model returned JSON that is not an object");
    }
    Ok(parsed)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
