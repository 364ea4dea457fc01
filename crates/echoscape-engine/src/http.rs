use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use thiserror::Error;

/// Non-success HTTP answer from an upstream provider. Kept as a typed error
/// so callers can downcast through an `anyhow` chain and read the status.
#[derive(Debug, Error)]
#[error("{provider} request failed ({status}): {body}")]
pub struct ProviderHttpError {
    pub provider: String,
    pub status: u16,
    pub body: String,
}

impl ProviderHttpError {
    pub fn find(err: &anyhow::Error) -> Option<&ProviderHttpError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<ProviderHttpError>())
    }
}

pub fn http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

pub fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        return Err(ProviderHttpError {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        }
        .into());
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
