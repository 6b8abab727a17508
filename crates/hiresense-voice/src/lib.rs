//! # HireSense Voice - speech provider chains
//!
//! The interviewer speaks and listens through ordered chains of interchangeable providers.
//! Each call walks its chain until one provider succeeds; when all of them fail the call
//! degrades (silence for TTS, "" for STT) instead of failing the interview.
//!
//! ```text
//!            say(text)                                  listen(secs)
//!               │                                            │
//!   ┌───────────▼───────────┐                  ┌─────────────▼────────────┐
//!   │ TTS chain             │                  │ Capture chain            │
//!   │ ElevenLabs → Gemini → │                  │ microphone (cpal) / none │
//!   │ Groq → local voice    │                  └─────────────┬────────────┘
//!   └───────────┬───────────┘                                │ WAV
//!               │ audio                        ┌─────────────▼────────────┐
//!   ┌───────────▼───────────┐                  │ STT chain                │
//!   │ AudioSink (rodio/null)│                  │ ElevenLabs → Gemini →    │
//!   └───────────────────────┘                  │ Groq Whisper             │
//!                                              └──────────────────────────┘
//! ```

pub mod capture;
pub mod chain;
pub mod error;
mod http;
pub mod playback;
pub mod settings;
pub mod speech;
pub mod stt;
pub mod tts;

#[cfg(feature = "audio-devices")]
pub use capture::MicCapture;
pub use capture::{AudioCapture, CaptureChain, CapturedAudio, NoCapture};
pub use chain::{ChainExhausted, ChainOutcome, ChainSuccess, NamedProvider, ProviderChain};
pub use error::{VoiceError, VoiceResult};
pub use http::GROQ_OPENAI_BASE;
#[cfg(feature = "audio-devices")]
pub use playback::SpeakerSink;
pub use playback::{AudioSink, NullSink};
pub use settings::{env_key, non_empty_key, SpeechSettings};
pub use speech::SpeechPipeline;
pub use stt::{ElevenLabsStt, FixedStt, GeminiStt, OpenAiCompatStt, SttChain, SttProvider};
pub use tts::{
    ElevenLabsTts, GeminiTts, LocalCommandTts, OpenAiCompatTts, SilentTts, TtsChain, TtsProvider,
};
