//! **Text-to-Speech** providers and the TTS chain.
//!
//! Default order: ElevenLabs, Gemini TTS, Groq (OpenAI-compatible `playai-tts`), local OS voice.
//! If the whole chain fails the interviewer stays silent and the session carries on.

use crate::capture::pcm_i16le_to_wav;
use crate::chain::{ChainExhausted, ChainSuccess, NamedProvider, ProviderChain};
use crate::error::{VoiceError, VoiceResult};
use crate::http::{self, GeminiResponse, ELEVENLABS_API_BASE};
use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;
use tracing::warn;

/// Backend that turns text into audio bytes (WAV/MP3).
#[async_trait]
pub trait TtsProvider: NamedProvider {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

pub type TtsChain = ProviderChain<dyn TtsProvider>;

impl ProviderChain<dyn TtsProvider> {
    /// First provider that returns audio wins.
    pub async fn synthesize(&self, text: &str) -> Result<ChainSuccess<Vec<u8>>, ChainExhausted> {
        self.first_success(|p| async move {
            match p.synthesize(text).await {
                Ok(audio) if audio.is_empty() => {
                    Err(VoiceError::Tts("provider returned no audio".to_string()))
                }
                other => other,
            }
        })
        .await
    }

    /// Like `synthesize`, but an exhausted chain (or blank text) yields `None`: silence.
    pub async fn synthesize_or_silence(&self, text: &str) -> Option<ChainSuccess<Vec<u8>>> {
        if text.trim().is_empty() {
            return None;
        }
        match self.synthesize(text).await {
            Ok(done) => Some(done),
            Err(e) => {
                warn!(target: "hiresense::voice", error = %e, "TTS chain exhausted; continuing silently");
                None
            }
        }
    }
}

/// Placeholder TTS: succeeds with no audio. In a chain that counts as a failure, so it is
/// only useful standalone (tests, headless runs where silence is fine).
#[derive(Debug, Default)]
pub struct SilentTts;

impl NamedProvider for SilentTts {
    fn name(&self) -> &str {
        "silent"
    }
}

#[async_trait]
impl TtsProvider for SilentTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// ElevenLabs `text-to-speech/{voice_id}` (MP3).
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    api_key: String,
    voice_id: String,
    model_id: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs-tts"
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let url = format!(
            "{}/text-to-speech/{}?output_format=mp3_44100_128",
            ELEVENLABS_API_BASE, self.voice_id
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Tts).await?;
        Ok(res.bytes().await?.to_vec())
    }
}

/// Gemini TTS (`generateContent` with AUDIO modality). Gemini returns raw 16-bit PCM,
/// which is wrapped as WAV here.
#[derive(Debug, Clone)]
pub struct GeminiTts {
    api_key: String,
    model: String,
    voice: String,
    sample_rate: u32,
    client: reqwest::Client,
}

impl GeminiTts {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            sample_rate: 24_000,
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for GeminiTts {
    fn name(&self) -> &str {
        "gemini-tts"
    }
}

#[async_trait]
impl TtsProvider for GeminiTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice } }
                }
            }
        });
        let res = self
            .client
            .post(http::gemini_generate_url(&self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Tts).await?;
        let parsed: GeminiResponse = res.json().await?;
        let inline = parsed
            .first_inline()
            .ok_or_else(|| VoiceError::Tts("Gemini TTS returned no audio parts".to_string()))?;
        let pcm = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| VoiceError::Tts(format!("bad base64 audio: {}", e)))?;
        pcm_i16le_to_wav(&pcm, self.sample_rate)
    }
}

/// OpenAI-compatible `/audio/speech` (Groq `playai-tts`, OpenAI `tts-1`, OpenRouter).
#[derive(Debug, Clone)]
pub struct OpenAiCompatTts {
    label: String,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    client: reqwest::Client,
}

impl OpenAiCompatTts {
    pub fn new(
        label: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        Ok(Self {
            label: label.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client: http::client(timeout)?,
        })
    }
}

impl NamedProvider for OpenAiCompatTts {
    fn name(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl TtsProvider for OpenAiCompatTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let res = http::check_status(res, VoiceError::Tts).await?;
        Ok(res.bytes().await?.to_vec())
    }
}

/// Local OS voice: runs a command that prints WAV to stdout (default `espeak-ng --stdout`).
/// The text is passed as the final argument.
#[derive(Debug, Clone)]
pub struct LocalCommandTts {
    program: String,
    args: Vec<String>,
}

impl LocalCommandTts {
    /// `command[0]` is the program, the rest are leading arguments.
    pub fn from_command(command: &[String]) -> VoiceResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| VoiceError::Config("local TTS command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl NamedProvider for LocalCommandTts {
    fn name(&self) -> &str {
        "local-tts"
    }
}

#[async_trait]
impl TtsProvider for LocalCommandTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(VoiceError::Tts(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}
