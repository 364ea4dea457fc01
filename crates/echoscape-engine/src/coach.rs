use std::sync::Arc;

use echoscape_contracts::events::{EventLog, EventPayload};
use echoscape_contracts::sessions::{Message, Role};
use serde_json::json;

use crate::http::{error_chain_text, ProviderHttpError};
use crate::language::{ChatTurn, CompletionRequest, LanguageModel};
use crate::retry::{is_rate_limited, retry_on_rate_limit, RetryPolicy, Sleeper};

const SYSTEM_PROMPT: &str = "You are an empathetic, reflective journaling companion named Echo.
Your goal is to help the user explore their thoughts and feelings through conversation.

GUIDELINES:
- Listen attentively and mirror the user's emotions.
- Ask open-ended, reflective questions to deepen the user's understanding.
- Validate their feelings (e.g., \"It makes sense that you feel that way\").
- Avoid giving advice, fixing problems, or acting as a medical professional.
- Use warm, non-clinical language.
- Keep responses concise (2-4 sentences usually).
- If the user seems overwhelmed, suggest breaking things down.

IMPORTANT:
- You are NOT a licensed therapist. Do not diagnose or prescribe.
- If the user expresses self-harm or severe crisis, gently urge them to seek professional help.";

pub const HISTORY_WINDOW: usize = 20;

pub const UNCONFIGURED_REPLY: &str = "I apologize, but I'm not properly configured at the moment. Please check the server configuration.";
pub const AUTH_FAILURE_REPLY: &str =
    "I'm having trouble connecting. Please check that the API key is valid.";
pub const RATE_LIMITED_REPLY: &str = "I'm a bit overwhelmed right now. The service is experiencing high demand - please try again in a minute.";
pub const SAFETY_FAILURE_REPLY: &str =
    "I want to make sure I respond thoughtfully. Could you rephrase what's on your mind?";
pub const GENERIC_FAILURE_REPLY: &str = "I'm listening, but I'm having a little trouble thinking of a response right now. Could you tell me more?";

/// Conversational replies from the active generative model.
pub struct Coach {
    model: Option<Arc<dyn LanguageModel>>,
    retry: RetryPolicy,
    sleeper: Sleeper,
}

impl Coach {
    pub fn new(model: Option<Arc<dyn LanguageModel>>, sleeper: Sleeper) -> Self {
        Self {
            model,
            retry: RetryPolicy::generative(),
            sleeper,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Never fails. `history` is the conversation before `message`.
    pub fn reply(&self, history: &[Message], message: &str, events: &EventLog) -> String {
        let Some(model) = self.model.as_ref() else {
            record_reply(events, None, false, None);
            return UNCONFIGURED_REPLY.to_string();
        };

        let request = build_request(history, message);
        let result = retry_on_rate_limit(
            self.retry,
            &self.sleeper,
            |_| model.complete(&request),
            |attempt, delay, _| {
                let mut payload = EventPayload::new();
                payload.insert("provider".to_string(), json!(model.name()));
                payload.insert("attempt".to_string(), json!(attempt));
                payload.insert("delay_ms".to_string(), json!(delay.as_millis() as u64));
                events.record("reply_rate_limited", payload);
            },
        );
        match result {
            Ok(text) => {
                record_reply(events, Some(model.name()), true, None);
                strip_speaker_prefix(&text)
            }
            Err(err) => {
                record_reply(
                    events,
                    Some(model.name()),
                    false,
                    Some(error_chain_text(&err, 300)),
                );
                failure_reply(&err).to_string()
            }
        }
    }
}

fn build_request(history: &[Message], message: &str) -> CompletionRequest {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut turns = history[start..]
        .iter()
        .filter(|row| row.role != Role::System)
        .map(|row| match row.role {
            Role::User => ChatTurn::user(row.content.clone()),
            _ => ChatTurn::assistant(row.content.clone()),
        })
        .collect::<Vec<_>>();
    turns.push(ChatTurn::user(message));
    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        turns,
        json: false,
        temperature: 0.8,
        max_tokens: 300,
    }
}

fn strip_speaker_prefix(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("Echo:")
        .map(str::trim_start)
        .unwrap_or(trimmed)
        .to_string()
}

pub fn failure_reply(err: &anyhow::Error) -> &'static str {
    let text = format!("{err:#}").to_ascii_lowercase();
    let status = ProviderHttpError::find(err).map(|http| http.status);
    if status == Some(401) || text.contains("api key") {
        return AUTH_FAILURE_REPLY;
    }
    if is_rate_limited(err) {
        return RATE_LIMITED_REPLY;
    }
    if text.contains("content_policy") || text.contains("safety") {
        return SAFETY_FAILURE_REPLY;
    }
    GENERIC_FAILURE_REPLY
}

fn record_reply(events: &EventLog, provider: Option<&str>, ok: bool, error: Option<String>) {
    let mut payload = EventPayload::new();
    payload.insert("provider".to_string(), json!(provider));
    payload.insert("ok".to_string(), json!(ok));
    if let Some(error) = error {
        payload.insert("error".to_string(), json!(error));
    }
    events.record("reply_generated", payload);
}
