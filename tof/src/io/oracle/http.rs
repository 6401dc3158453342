//! Completion provider for OpenAI-compatible `/chat/completions` endpoints.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{Completion, OracleCall, clip};
use crate::core::action::{CompletionOptions, Message};
use crate::error::EngineError;

/// Error bodies are quoted in messages up to this many bytes.
const ERROR_BODY_LIMIT: usize = 2_000;

#[derive(Debug, Clone)]
pub struct HttpCompletion {
    base_url: String,
    api_key: String,
    defaults: CompletionOptions,
    http: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCompletion {
    /// `defaults.model` must be set; per-call options override it.
    pub fn new(base_url: &str, api_key: String, defaults: CompletionOptions) -> Result<Self> {
        let http = Client::builder().build().context("build http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            defaults,
            http,
        })
    }

    /// Read the bearer key from `api_key_env`; a missing variable means no auth.
    pub fn from_env(base_url: &str, api_key_env: &str, defaults: CompletionOptions) -> Result<Self> {
        let api_key = std::env::var(api_key_env).unwrap_or_default();
        if api_key.trim().is_empty() {
            warn!(api_key_env = %api_key_env, "oracle api key not set; sending unauthenticated requests");
        }
        Self::new(base_url, api_key, defaults)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [Message],
        options: &'a CompletionOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: options
                .model
                .as_deref()
                .or(self.defaults.model.as_deref())
                .unwrap_or_default(),
            messages: messages
                .iter()
                .map(|message| ChatMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            temperature: options.temperature.or(self.defaults.temperature),
            max_tokens: options.max_tokens.or(self.defaults.max_tokens),
        }
    }
}

impl Completion for HttpCompletion {
    #[instrument(skip_all, fields(url = %self.endpoint(), messages = messages.len()))]
    fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        call: &OracleCall,
    ) -> Result<String> {
        if call.cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        let body = self.request_body(messages, options);
        let mut request = self.http.post(self.endpoint()).timeout(call.timeout).json(&body);
        if !self.api_key.trim().is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().map_err(|err| transport_error(&err, call))?;
        let status = response.status();
        let text = response.text().map_err(|err| transport_error(&err, call))?;
        debug!(%status, bytes = text.len(), "oracle http response");
        if !status.is_success() {
            return Err(EngineError::OracleUnavailable(format!(
                "{status}: {}",
                clip(&text, ERROR_BODY_LIMIT)
            ))
            .into());
        }
        extract_content(&text).map_err(Into::into)
    }
}

fn transport_error(err: &reqwest::Error, call: &OracleCall) -> EngineError {
    if err.is_timeout() {
        EngineError::OracleTimeout {
            secs: call.timeout.as_secs(),
        }
    } else {
        EngineError::OracleUnavailable(err.to_string())
    }
}

fn extract_content(body: &str) -> Result<String, EngineError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| EngineError::OracleUnavailable(format!("malformed completion body: {err}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| EngineError::OracleUnavailable("completion has no message content".to_string()))
}
