//! `SpeechPipeline`: the interviewer's mouth and ears.
//!
//! `say` runs the TTS chain and plays whatever came back; `listen` runs the capture chain
//! and then the STT chain. Neither ever fails: silence and "" are the degraded results.

use crate::capture::{CaptureChain, CapturedAudio};
use crate::playback::{AudioSink, NullSink};
use crate::stt::SttChain;
use crate::tts::TtsChain;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SpeechPipeline {
    tts: TtsChain,
    capture: CaptureChain,
    stt: SttChain,
    sink: Arc<dyn AudioSink>,
}

impl SpeechPipeline {
    pub fn new(tts: TtsChain, capture: CaptureChain, stt: SttChain) -> Self {
        Self {
            tts,
            capture,
            stt,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn tts(&self) -> &TtsChain {
        &self.tts
    }

    pub fn stt(&self) -> &SttChain {
        &self.stt
    }

    pub fn capture(&self) -> &CaptureChain {
        &self.capture
    }

    /// Speak `text`. Returns whether any audio was produced.
    pub async fn say(&self, text: &str) -> bool {
        info!(target: "hiresense::voice", "🗣 {}", text);
        let Some(audio) = self.tts.synthesize_or_silence(text).await else {
            return false;
        };
        debug!(target: "hiresense::voice", provider = %audio.provider, bytes = audio.value.len(), "synthesized");
        if let Err(e) = self.sink.play(&audio.value).await {
            warn!(target: "hiresense::voice", "Playback failed: {}", e);
        }
        true
    }

    /// Record one answer window. `None` when every capture provider failed.
    pub async fn record(&self, duration: Duration) -> Option<CapturedAudio> {
        match self
            .capture
            .first_success(|c| async move { c.record(duration).await })
            .await
        {
            Ok(done) => Some(done.value),
            Err(e) => {
                warn!(target: "hiresense::voice", error = %e, "capture chain exhausted; answer treated as silence");
                None
            }
        }
    }

    /// Record for `duration` and transcribe. Always returns a string, possibly empty.
    pub async fn listen(&self, duration: Duration) -> String {
        let Some(audio) = self.record(duration).await else {
            return String::new();
        };
        let text = self.stt.transcribe_or_empty(&audio).await;
        info!(target: "hiresense::voice", "📝 heard: {:?}", text);
        text
    }
}
