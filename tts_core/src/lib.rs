pub mod catalog;
pub mod engine;
pub mod error;
pub mod stream;
pub mod wav;

use std::time::Instant;

pub use catalog::{language_from_voice_id, VoiceCatalog, VoiceEntry};
pub use engine::{Attribution, SpeechEngine, SynthesisParams};
#[cfg(feature = "piper")]
pub use engine::PiperEngine;
pub use error::{TtsError, TtsResult};
pub use stream::{chunk_audio, AudioChunks, AudioFrame};

/// Decoded engine output, owned by the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioResult {
    pub sample_rate: u32,
    /// Bytes per sample
    pub sample_width: u16,
    pub channels: u16,
    /// Interleaved little-endian PCM
    pub pcm: Vec<u8>,
}

impl AudioResult {
    pub fn bytes_per_sample(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    pub fn duration_ms(&self) -> u64 {
        let frame_bytes = self.bytes_per_sample() as u64;
        if frame_bytes == 0 || self.sample_rate == 0 {
            return 0;
        }
        self.pcm.len() as u64 / frame_bytes * 1000 / self.sample_rate as u64
    }
}

/// Turns text into an [`AudioResult`] using a [`SpeechEngine`].
///
/// The engine renders into a temporary WAV file which is read back and
/// removed before `synthesize` returns. No state is kept between calls.
pub struct Synthesizer {
    engine: Box<dyn SpeechEngine>,
    params: SynthesisParams,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("engine", &self.engine.name())
            .field("params", &self.params)
            .finish()
    }
}

impl Synthesizer {
    /// `params` should come from [`SynthesisParams::for_engine`].
    pub fn new(engine: Box<dyn SpeechEngine>, params: SynthesisParams) -> Self {
        Self { engine, params }
    }

    pub fn engine(&self) -> &dyn SpeechEngine {
        self.engine.as_ref()
    }

    pub fn params(&self) -> &SynthesisParams {
        &self.params
    }

    pub fn synthesize(&self, text: &str) -> TtsResult<AudioResult> {
        let text = text.trim();
        let start = Instant::now();

        // Dropping the handle deletes the file, whichever way we leave
        let output = tempfile::Builder::new()
            .prefix("tts-")
            .suffix(".wav")
            .tempfile()?;

        self.engine
            .synthesize_to_file(text, &self.params, output.path())
            .map_err(TtsError::Synthesis)?;

        let audio = wav::read_wav_file(output.path())?;

        tracing::debug!(
            engine = self.engine.name(),
            text_len = text.len(),
            bytes = audio.pcm.len(),
            duration_ms = audio.duration_ms(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Synthesis completed"
        );
        Ok(audio)
    }
}
