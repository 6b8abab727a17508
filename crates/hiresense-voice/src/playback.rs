//! Playback of synthesized speech.
//!
//! `NullSink` discards audio (headless gateway, tests). `SpeakerSink` plays through the
//! default output device with rodio and returns once playback has finished, so the
//! interviewer never records over its own voice.

use crate::error::VoiceResult;
use async_trait::async_trait;

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play encoded audio (WAV/MP3) to completion.
    async fn play(&self, audio: &[u8]) -> VoiceResult<()>;
}

#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, _audio: &[u8]) -> VoiceResult<()> {
        Ok(())
    }
}

#[cfg(feature = "audio-devices")]
mod speaker {
    use super::*;
    use crate::error::VoiceError;
    use rodio::{OutputStream, Sink, Source};
    use std::io::Cursor;

    #[derive(Debug, Default)]
    pub struct SpeakerSink;

    #[async_trait]
    impl AudioSink for SpeakerSink {
        async fn play(&self, audio: &[u8]) -> VoiceResult<()> {
            if audio.is_empty() {
                return Ok(());
            }
            let bytes = audio.to_vec();
            // OutputStream is !Send: open, play and drain on one blocking thread.
            tokio::task::spawn_blocking(move || -> VoiceResult<()> {
                let (_stream, handle) = OutputStream::try_default()
                    .map_err(|e| VoiceError::Playback(e.to_string()))?;
                let sink = Sink::try_new(&handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
                let source = rodio::Decoder::new(Cursor::new(bytes))
                    .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
                sink.append(source.convert_samples::<f32>());
                sink.sleep_until_end();
                Ok(())
            })
            .await
            .map_err(|e| VoiceError::Playback(e.to_string()))?
        }
    }
}

#[cfg(feature = "audio-devices")]
pub use speaker::SpeakerSink;
