//! Audio capture: the input stage of the STT chain.
//!
//! A capture provider records a fixed window of mono audio and hands back WAV bytes.
//! Capture failures (no device, stream error) degrade the same way STT failures do:
//! the listener returns an empty transcript.

use crate::chain::{NamedProvider, ProviderChain};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::time::Duration;

/// Default capture rate, mono.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// One recorded answer window, already encoded as 16-bit mono WAV.
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration: Duration,
    pub captured_at: DateTime<Utc>,
}

impl CapturedAudio {
    /// Encode f32 samples (-1.0..=1.0) as a capture result.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> VoiceResult<Self> {
        let secs = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        Ok(Self {
            wav: pcm_f32_to_wav(samples, sample_rate)?,
            sample_rate,
            duration: Duration::from_secs_f64(secs),
            captured_at: Utc::now(),
        })
    }
}

/// A source of answer audio (microphone, file, test script).
#[async_trait]
pub trait AudioCapture: NamedProvider {
    /// Record for `duration` and return the captured window.
    async fn record(&self, duration: Duration) -> VoiceResult<CapturedAudio>;
}

/// Ordered capture providers; tried like any other chain.
pub type CaptureChain = ProviderChain<dyn AudioCapture>;

/// Capture provider for hosts without an input device. Always fails, so every listen
/// degrades to an empty transcript.
#[derive(Debug, Default)]
pub struct NoCapture;

impl NamedProvider for NoCapture {
    fn name(&self) -> &str {
        "no-capture"
    }
}

#[async_trait]
impl AudioCapture for NoCapture {
    async fn record(&self, _duration: Duration) -> VoiceResult<CapturedAudio> {
        Err(VoiceError::AudioDevice("no capture device configured".to_string()))
    }
}

/// Encode f32 PCM (mono) as 16-bit WAV bytes for upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Wrap raw little-endian 16-bit mono PCM in a WAV container (Gemini TTS returns bare PCM).
pub fn pcm_i16le_to_wav(pcm: &[u8], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// -----------------------------------------------------------------------------
// Microphone capture (cpal). Enable with --features audio-devices.
// -----------------------------------------------------------------------------
#[cfg(feature = "audio-devices")]
mod mic {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info, warn};

    /// Default input device, downmixed to mono. Records at `preferred_rate` when the device
    /// supports it, otherwise at the device default.
    #[derive(Debug, Clone)]
    pub struct MicCapture {
        preferred_rate: u32,
    }

    impl MicCapture {
        pub fn new(preferred_rate: u32) -> Self {
            Self { preferred_rate }
        }

        /// Whether the host reports a default input device right now.
        pub fn is_available() -> bool {
            cpal::default_host().default_input_device().is_some()
        }
    }

    impl NamedProvider for MicCapture {
        fn name(&self) -> &str {
            "microphone"
        }
    }

    #[async_trait]
    impl AudioCapture for MicCapture {
        async fn record(&self, duration: Duration) -> VoiceResult<CapturedAudio> {
            let preferred = self.preferred_rate;
            // cpal streams are !Send; the whole recording lives on a blocking thread.
            tokio::task::spawn_blocking(move || record_blocking(duration, preferred))
                .await
                .map_err(|e| VoiceError::Capture(e.to_string()))?
        }
    }

    fn log_stream_error(err: cpal::StreamError) {
        warn!(target: "hiresense::voice", "Audio stream error: {}", err);
    }

    fn push_mono(buffer: &Mutex<Vec<f32>>, frames: impl Iterator<Item = f32>, channels: usize) {
        let Ok(mut buf) = buffer.lock() else { return };
        let mut acc = 0.0f32;
        let mut n = 0usize;
        for s in frames {
            acc += s;
            n += 1;
            if n == channels {
                buf.push(acc / channels as f32);
                acc = 0.0;
                n = 0;
            }
        }
    }

    fn record_blocking(duration: Duration, preferred: u32) -> VoiceResult<CapturedAudio> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
        info!(
            target: "hiresense::voice",
            "🎤 Recording {:.0}s from {}",
            duration.as_secs_f32(),
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let preferred_cfg = device.supported_input_configs().ok().and_then(|mut cfgs| {
            cfgs.find(|c| c.min_sample_rate().0 <= preferred && preferred <= c.max_sample_rate().0)
                .map(|c| c.with_sample_rate(cpal::SampleRate(preferred)))
        });
        let chosen = match preferred_cfg {
            Some(c) => c,
            None => device.default_input_config()?,
        };
        let channels = chosen.channels().max(1) as usize;
        let sample_rate = chosen.sample_rate().0;
        let stream_config: cpal::StreamConfig = chosen.config();
        debug!(target: "hiresense::voice", ?stream_config, "capture config");

        let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
        let stream = match chosen.sample_format() {
            cpal::SampleFormat::F32 => {
                let sink = Arc::clone(&buffer);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push_mono(&sink, data.iter().copied(), channels)
                    },
                    log_stream_error,
                    None,
                )?
            }
            cpal::SampleFormat::I16 => {
                let sink = Arc::clone(&buffer);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        push_mono(
                            &sink,
                            data.iter().map(|&s| s as f32 / i16::MAX as f32),
                            channels,
                        )
                    },
                    log_stream_error,
                    None,
                )?
            }
            other => {
                return Err(VoiceError::AudioDevice(format!(
                    "unsupported input sample format {:?}",
                    other
                )))
            }
        };
        stream.play()?;
        std::thread::sleep(duration);
        drop(stream);

        let samples = buffer
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .map_err(|e| VoiceError::Capture(format!("capture buffer poisoned: {}", e)))?;
        if samples.is_empty() {
            return Err(VoiceError::Capture("input stream produced no samples".to_string()));
        }
        CapturedAudio::from_samples(&samples, sample_rate)
    }
}

#[cfg(feature = "audio-devices")]
pub use mic::MicCapture;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_and_length() {
        let wav = pcm_f32_to_wav(&[0.0, 0.5, -0.5, 1.0], 24_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header plus 4 samples of 2 bytes each
        assert_eq!(wav.len(), 44 + 8);
    }

    #[test]
    fn raw_pcm_is_wrapped_and_readable() {
        let pcm: Vec<u8> = [100i16, -100, 0].iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_i16le_to_wav(&pcm, 24_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![100, -100, 0]);
    }

    #[test]
    fn captured_audio_reports_duration() {
        let audio = CapturedAudio::from_samples(&vec![0.0; 12_000], 24_000).unwrap();
        assert_eq!(audio.duration, Duration::from_millis(500));
        assert_eq!(audio.sample_rate, 24_000);
    }

    #[tokio::test]
    async fn no_capture_always_fails() {
        let err = NoCapture.record(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, VoiceError::AudioDevice(_)));
    }
}
