//! Client for an OpenAI-style `/v1/completions` endpoint.
//!
//! One POST per prompt, no retries. The response must carry its text at
//! `choices[0].text`; anything else is reported as a [`MalformedResponse`].

use std::time::Duration;

use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config;

/// Longest slice of an error body kept in [`CompletionError::Status`].
const ERROR_BODY_EXCERPT: usize = 512;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to the completion API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected completion API response: {0}")]
    MalformedResponse(#[from] MalformedResponse),
}

#[derive(Debug, Error)]
pub enum MalformedResponse {
    #[error("body is not valid JSON: {0}")]
    Body(#[source] serde_json::Error),
    #[error("body is not a JSON object")]
    NotObject,
    #[error("choices field is missing")]
    MissingChoices,
    #[error("choices field is not an array")]
    ChoicesNotArray,
    #[error("choices array is empty")]
    EmptyChoices,
    #[error("first element of choices array is not an object")]
    ChoiceNotObject,
    #[error("text field in first element of choices array is not a string")]
    MissingText,
}

/// Something that can turn a prompt into completion text.
#[serenity::async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: String,
}

/// Completion client shared by every interaction. `reqwest::Client` pools
/// connections internally and is safe to use from many tasks at once.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    settings: config::Completion,
    api_key: Option<String>,
}
impl CompletionClient {
    pub fn new(settings: config::Completion, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            settings,
            api_key,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.settings.model,
            prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }
}
#[serenity::async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        tracing::debug!(
            model = %self.settings.model,
            prompt_len = prompt.len(),
            "sending completion request"
        );
        // A missing key still sends the header so the API reports the auth failure.
        let bearer = format!("Bearer {}", self.api_key.as_deref().unwrap_or_default());

        let response = self
            .http
            .post(&self.settings.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, bearer)
            .json(&self.request(prompt))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(%status, body_len = body.len(), "completion API responded");

        if !status.is_success() {
            return Err(CompletionError::Status {
                status,
                body: excerpt(&body, ERROR_BODY_EXCERPT).to_string(),
            });
        }

        Ok(extract_text(&body)?)
    }
}

/// Pulls `choices[0].text` out of a completion response body.
pub fn extract_text(body: &str) -> Result<String, MalformedResponse> {
    let value: Value = serde_json::from_str(body).map_err(MalformedResponse::Body)?;
    if !value.is_object() {
        return Err(MalformedResponse::NotObject);
    }
    let response: CompletionResponse =
        serde_json::from_value(value).map_err(MalformedResponse::Body)?;

    let choices = match response.choices {
        None | Some(Value::Null) => return Err(MalformedResponse::MissingChoices),
        Some(Value::Array(choices)) => choices,
        Some(_) => return Err(MalformedResponse::ChoicesNotArray),
    };
    let first = choices
        .into_iter()
        .next()
        .ok_or(MalformedResponse::EmptyChoices)?;
    if !first.is_object() {
        return Err(MalformedResponse::ChoiceNotObject);
    }
    let choice: Choice =
        serde_json::from_value(first).map_err(|_| MalformedResponse::MissingText)?;

    Ok(choice.text)
}

/// Cuts `text` to at most `max_chars` characters.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
