//! Provider settings and chain construction.
//!
//! A provider joins its chain only when its API key is present. Keys can come from the
//! config file / `HIRESENSE__SPEECH__*` or from the conventional variables
//! (`ELEVENLABS_API_KEY`, `GEMINI_API_KEY` / `GOOGLE_API_KEY`, `GROQ_API_KEY`).

use crate::capture::{CaptureChain, NoCapture, DEFAULT_SAMPLE_RATE};
use crate::error::VoiceResult;
use crate::http::GROQ_OPENAI_BASE;
use crate::speech::SpeechPipeline;
use crate::stt::{ElevenLabsStt, GeminiStt, OpenAiCompatStt, SttChain};
use crate::tts::{ElevenLabsTts, GeminiTts, LocalCommandTts, OpenAiCompatTts, TtsChain};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Per-attempt timeout for TTS/STT providers.
    pub provider_timeout_secs: u64,
    /// Per-attempt timeout for capture; must exceed the longest record window.
    pub capture_timeout_secs: u64,
    /// Preferred capture rate (mono).
    pub sample_rate: u32,
    /// Record from the default microphone (needs the `audio-devices` feature).
    pub microphone: bool,
    /// Play synthesized speech on the default output device (needs `audio-devices`).
    pub speaker: bool,

    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_tts_model: String,
    pub elevenlabs_stt_model: String,

    pub gemini_api_key: Option<String>,
    pub gemini_tts_model: String,
    pub gemini_tts_voice: String,
    pub gemini_stt_model: String,

    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_tts_model: String,
    pub groq_tts_voice: String,
    pub groq_stt_model: String,

    /// Program plus leading args for the local voice. Empty disables it.
    pub local_tts_command: Vec<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 30,
            capture_timeout_secs: 90,
            sample_rate: DEFAULT_SAMPLE_RATE,
            microphone: true,
            speaker: true,
            elevenlabs_api_key: None,
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            elevenlabs_tts_model: "eleven_multilingual_v2".to_string(),
            elevenlabs_stt_model: "scribe_v1".to_string(),
            gemini_api_key: None,
            gemini_tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            gemini_tts_voice: "Kore".to_string(),
            gemini_stt_model: "gemini-2.5-flash".to_string(),
            groq_api_key: None,
            groq_base_url: GROQ_OPENAI_BASE.to_string(),
            groq_tts_model: "playai-tts".to_string(),
            groq_tts_voice: "Fritz-PlayAI".to_string(),
            groq_stt_model: "whisper-large-v3-turbo".to_string(),
            local_tts_command: vec!["espeak-ng".to_string(), "--stdout".to_string()],
        }
    }
}

/// A configured key, ignoring blank values.
pub fn non_empty_key(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// First non-blank value among the environment variables `names`.
pub fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl SpeechSettings {
    /// Fill missing keys from the conventional provider environment variables.
    pub fn with_env_fallbacks(mut self) -> Self {
        if non_empty_key(&self.elevenlabs_api_key).is_none() {
            self.elevenlabs_api_key = env_key(&["ELEVENLABS_API_KEY"]);
        }
        if non_empty_key(&self.gemini_api_key).is_none() {
            self.gemini_api_key = env_key(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
        }
        if non_empty_key(&self.groq_api_key).is_none() {
            self.groq_api_key = env_key(&["GROQ_API_KEY"]);
        }
        self
    }

    fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    /// ElevenLabs → Gemini (sticky) → Groq (sticky) → local voice.
    pub fn build_tts_chain(&self) -> VoiceResult<TtsChain> {
        let timeout = self.provider_timeout();
        let mut chain = TtsChain::new("tts").with_timeout(timeout);
        if let Some(key) = non_empty_key(&self.elevenlabs_api_key) {
            chain.push(
                Arc::new(ElevenLabsTts::new(
                    key,
                    &self.elevenlabs_voice_id,
                    &self.elevenlabs_tts_model,
                    timeout,
                )?),
                false,
            );
        }
        if let Some(key) = non_empty_key(&self.gemini_api_key) {
            chain.push(
                Arc::new(GeminiTts::new(
                    key,
                    &self.gemini_tts_model,
                    &self.gemini_tts_voice,
                    timeout,
                )?),
                true,
            );
        }
        if let Some(key) = non_empty_key(&self.groq_api_key) {
            chain.push(
                Arc::new(OpenAiCompatTts::new(
                    "groq-tts",
                    &self.groq_base_url,
                    key,
                    &self.groq_tts_model,
                    &self.groq_tts_voice,
                    timeout,
                )?),
                true,
            );
        }
        if !self.local_tts_command.is_empty() {
            chain.push(
                Arc::new(LocalCommandTts::from_command(&self.local_tts_command)?),
                false,
            );
        }
        info!(target: "hiresense::voice", providers = ?chain.names(), "🔊 TTS chain ready");
        Ok(chain)
    }

    /// ElevenLabs Scribe → Gemini → Groq Whisper.
    pub fn build_stt_chain(&self) -> VoiceResult<SttChain> {
        let timeout = self.provider_timeout();
        let mut chain = SttChain::new("stt").with_timeout(timeout);
        if let Some(key) = non_empty_key(&self.elevenlabs_api_key) {
            chain.push(
                Arc::new(ElevenLabsStt::new(key, &self.elevenlabs_stt_model, timeout)?),
                false,
            );
        }
        if let Some(key) = non_empty_key(&self.gemini_api_key) {
            chain.push(
                Arc::new(GeminiStt::new(key, &self.gemini_stt_model, timeout)?),
                false,
            );
        }
        if let Some(key) = non_empty_key(&self.groq_api_key) {
            chain.push(
                Arc::new(OpenAiCompatStt::new(
                    "groq-whisper",
                    &self.groq_base_url,
                    key,
                    &self.groq_stt_model,
                    timeout,
                )?),
                false,
            );
        }
        info!(target: "hiresense::voice", providers = ?chain.names(), "👂 STT chain ready");
        Ok(chain)
    }

    /// Microphone when enabled and compiled in; otherwise a capture stage that always
    /// degrades to silence.
    pub fn build_capture_chain(&self) -> CaptureChain {
        let mut chain =
            CaptureChain::new("capture").with_timeout(Duration::from_secs(self.capture_timeout_secs.max(1)));
        self.push_microphone(&mut chain);
        if chain.is_empty() {
            chain.push(Arc::new(NoCapture), false);
        }
        info!(target: "hiresense::voice", providers = ?chain.names(), "🎤 capture chain ready");
        chain
    }

    pub fn build_pipeline(&self) -> VoiceResult<SpeechPipeline> {
        let pipeline = SpeechPipeline::new(
            self.build_tts_chain()?,
            self.build_capture_chain(),
            self.build_stt_chain()?,
        );
        Ok(self.attach_speaker(pipeline))
    }

    #[cfg(feature = "audio-devices")]
    fn push_microphone(&self, chain: &mut CaptureChain) {
        if self.microphone && crate::capture::MicCapture::is_available() {
            chain.push(Arc::new(crate::capture::MicCapture::new(self.sample_rate)), false);
        }
    }

    #[cfg(not(feature = "audio-devices"))]
    fn push_microphone(&self, _chain: &mut CaptureChain) {}

    #[cfg(feature = "audio-devices")]
    fn attach_speaker(&self, pipeline: SpeechPipeline) -> SpeechPipeline {
        if self.speaker {
            pipeline.with_sink(Arc::new(crate::playback::SpeakerSink))
        } else {
            pipeline
        }
    }

    #[cfg(not(feature = "audio-devices"))]
    fn attach_speaker(&self, pipeline: SpeechPipeline) -> SpeechPipeline {
        pipeline
    }
}
