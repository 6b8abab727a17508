//! OpenAI-compatible chat completions client, shared by the answer scorer and the
//! technical question generator.
//!
//! Groq and Gemini both expose an OpenAI-compatible `/chat/completions`, so one client
//! type covers both; an `LlmChain` tries them in order through the same combinator the
//! speech chains use.

use hiresense_voice::{NamedProvider, ProviderChain};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty completion")]
    Empty,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// One chat endpoint (base URL + key + model).
#[derive(Debug, Clone)]
pub struct ChatEndpoint {
    label: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ChatEndpoint {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            label: label.into(),
            base_url: base_url.into(),
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            client,
        })
    }

    /// Single-turn completion: system prompt + user prompt → assistant text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: Some(0.2),
            max_tokens: Some(1024),
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }
        let parsed: ChatResponse = res.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::Empty)
    }
}

impl NamedProvider for ChatEndpoint {
    fn name(&self) -> &str {
        &self.label
    }
}

pub type LlmChain = ProviderChain<ChatEndpoint>;

/// Strip Markdown code fences and return the outermost `open..close` slice, if any.
/// Models often wrap JSON in prose or ```json fences.
pub fn extract_json_block(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let end = raw.rfind(close)?;
    (end > start).then(|| &raw[start..=end])
}
