//! Chunked audio streaming.
//!
//! A synthesized utterance arrives as one PCM buffer. To stream it to a
//! client we cut the buffer into frames of `samples_per_chunk` samples
//! (across all channels) and hand them out one at a time, in order. The
//! last frame may be shorter than the others; an empty buffer yields no
//! frames at all.

use crate::error::{TtsError, TtsResult};
use crate::AudioResult;

/// One slice of PCM audio together with the format it was produced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub sample_width: u16,
    pub channels: u16,
}

/// Lazy, single-pass iterator over the frames of an [`AudioResult`].
#[derive(Debug)]
pub struct AudioChunks {
    result: AudioResult,
    bytes_per_chunk: usize,
    offset: usize,
}

/// Split `result` into frames of `samples_per_chunk` samples.
///
/// Fails with [`TtsError::Configuration`] when a chunk would be zero bytes
/// wide, before any frame is produced.
pub fn chunk_audio(result: AudioResult, samples_per_chunk: usize) -> TtsResult<AudioChunks> {
    let bytes_per_sample = result.bytes_per_sample();
    let bytes_per_chunk = bytes_per_sample
        .checked_mul(samples_per_chunk)
        .ok_or_else(|| TtsError::configuration("chunk size overflows"))?;

    if bytes_per_chunk == 0 {
        return Err(TtsError::configuration(format!(
            "chunk size must be positive (samples_per_chunk={samples_per_chunk}, bytes_per_sample={bytes_per_sample})"
        )));
    }

    Ok(AudioChunks {
        result,
        bytes_per_chunk,
        offset: 0,
    })
}

impl AudioChunks {
    pub fn bytes_per_chunk(&self) -> usize {
        self.bytes_per_chunk
    }
}

impl Iterator for AudioChunks {
    type Item = AudioFrame;

    fn next(&mut self) -> Option<AudioFrame> {
        let len = self.result.pcm.len();
        if self.offset >= len {
            return None;
        }
        let end = (self.offset + self.bytes_per_chunk).min(len);
        let audio = self.result.pcm[self.offset..end].to_vec();
        self.offset = end;

        Some(AudioFrame {
            audio,
            sample_rate: self.result.sample_rate,
            sample_width: self.result.sample_width,
            channels: self.result.channels,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.result.pcm.len().saturating_sub(self.offset);
        let n = remaining.div_ceil(self.bytes_per_chunk);
        (n, Some(n))
    }
}

impl ExactSizeIterator for AudioChunks {}
