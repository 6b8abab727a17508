//! **Speech-to-Text** providers and the STT chain.
//!
//! Default order: ElevenLabs Scribe, Gemini, Groq Whisper. An empty transcript from a
//! provider counts as a failure so the next provider gets a chance; if all fail the
//! answer is the empty string.

use crate::capture::CapturedAudio;
use crate::chain::{ChainExhausted, ChainSuccess, NamedProvider, ProviderChain};
use crate::error::{VoiceError, VoiceResult};
use crate::http::{self, GeminiResponse, ELEVENLABS_API_BASE};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::warn;

const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe this audio into plain text. Output only the transcription, no extra explanation.";

/// Backend for converting captured audio to text.
#[async_trait]
pub trait SttProvider: NamedProvider {
    /// Transcribe one answer window. Return an empty string if nothing was said.
    async fn transcribe(&self, audio: &CapturedAudio) -> VoiceResult<String>;
}

pub type SttChain = ProviderChain<dyn SttProvider>;

impl ProviderChain<dyn SttProvider> {
    /// First non-empty transcript wins.
    pub async fn transcribe(
        &self,
        audio: &CapturedAudio,
    ) -> Result<ChainSuccess<String>, ChainExhausted> {
        self.first_success(|p| async move {
            match p.transcribe(audio).await {
                Ok(text) if text.trim().is_empty() => {
                    Err(VoiceError::Stt("empty transcript".to_string()))
                }
                Ok(text) => Ok(text.trim().to_string()),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Like `transcribe`, but an exhausted chain yields "".
    pub async fn transcribe_or_empty(&self, audio: &CapturedAudio) -> String {
        match self.transcribe(audio).await {
            Ok(done) => done.value,
            Err(e) => {
                warn!(target: "hiresense::voice", error = %e, "STT chain exhausted; treating answer as empty");
                String::new()
            }
        }
    }
}

/// Placeholder STT: returns a fixed string. Use for exercising the interview loop without
/// any speech service.
#[derive(Debug, Default, Clone)]
pub struct FixedStt {
    response: String,
}

impl FixedStt {
    pub fn with_response(s: impl Into<String>) -> Self {
        Self { response: s.into() }
    }
}

impl NamedProvider for FixedStt {
    fn name(&self) -> &str {
        "fixed-stt"
    }
}

#[async_trait]
impl SttProvider for FixedStt {
    async fn transcribe(&self, _audio: &CapturedAudio) -> VoiceResult<String> {
        Ok(self.response.clone())
    }
}

fn wav_part(audio: &CapturedAudio) -> VoiceResult<Part> {
    Part::bytes(audio.wav.clone())
        .file_name("answer.wav")
        .mime_str("audio/wav")
        .map_err(|e| VoiceError::Stt(e.to_string()))
}

fn text_field(json: &serde_json::Value) -> String {
    json.get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// ElevenLabs `speech-to-text` (Scribe).
#[derive(Debug, Clone)]
pub struct ElevenLabsStt {
    api_key: String,
    model_id: String,
    client: reqwest::Client,
}

impl ElevenLabsStt {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model_id: model_id.into(),
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for ElevenLabsStt {
    fn name(&self) -> &str {
        "elevenlabs-stt"
    }
}

#[async_trait]
impl SttProvider for ElevenLabsStt {
    async fn transcribe(&self, audio: &CapturedAudio) -> VoiceResult<String> {
        let form = Form::new()
            .part("file", wav_part(audio)?)
            .text("model_id", self.model_id.clone())
            .text("language_code", "eng")
            .text("tag_audio_events", "false")
            .text("diarize", "false");
        let res = self
            .client
            .post(format!("{}/speech-to-text", ELEVENLABS_API_BASE))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Stt).await?;
        let json: serde_json::Value = res.json().await?;
        Ok(text_field(&json))
    }
}

/// Gemini multimodal transcription: WAV sent inline with a transcription instruction.
#[derive(Debug, Clone)]
pub struct GeminiStt {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiStt {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for GeminiStt {
    fn name(&self) -> &str {
        "gemini-stt"
    }
}

#[async_trait]
impl SttProvider for GeminiStt {
    async fn transcribe(&self, audio: &CapturedAudio) -> VoiceResult<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(&audio.wav);
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "audio/wav", "data": data } },
                    { "text": TRANSCRIBE_INSTRUCTION }
                ]
            }],
            "generationConfig": { "maxOutputTokens": 512 }
        });
        let res = self
            .client
            .post(http::gemini_generate_url(&self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Stt).await?;
        let parsed: GeminiResponse = res.json().await?;
        Ok(parsed.text())
    }
}

/// OpenAI-compatible `/audio/transcriptions` (Groq `whisper-large-v3-turbo`, OpenAI `whisper-1`).
#[derive(Debug, Clone)]
pub struct OpenAiCompatStt {
    label: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatStt {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            label: label.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for OpenAiCompatStt {
    fn name(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl SttProvider for OpenAiCompatStt {
    async fn transcribe(&self, audio: &CapturedAudio) -> VoiceResult<String> {
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let form = Form::new()
            .part("file", wav_part(audio)?)
            .text("model", self.model.clone())
            .text("language", "en")
            .text("response_format", "json");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Stt).await?;
        let json: serde_json::Value = res.json().await?;
        Ok(text_field(&json))
    }
}
