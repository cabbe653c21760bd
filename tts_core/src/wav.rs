use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::{TtsError, TtsResult};
use crate::AudioResult;

/// Read a WAV file back into raw little-endian PCM bytes plus its format.
///
/// The reader (and its file handle) is dropped before returning, on the
/// error paths as well.
pub fn read_wav_file<P: AsRef<Path>>(path: P) -> TtsResult<AudioResult> {
    let reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let width = spec.bits_per_sample.div_ceil(8);
    let channels = spec.channels;

    // Pre-allocate for the full data chunk
    let mut pcm = Vec::<u8>::with_capacity(reader.len() as usize * width as usize);

    match (spec.sample_format, width) {
        (SampleFormat::Int, 1) => {
            // hound exposes 8-bit WAV as signed; the container stores it unsigned
            for s in reader.into_samples::<i8>() {
                pcm.push((s? as i16 + 128) as u8);
            }
        }
        (SampleFormat::Int, 2) => {
            for s in reader.into_samples::<i16>() {
                pcm.extend_from_slice(&s?.to_le_bytes());
            }
        }
        (SampleFormat::Int, 3) => {
            for s in reader.into_samples::<i32>() {
                pcm.extend_from_slice(&s?.to_le_bytes()[..3]);
            }
        }
        (SampleFormat::Int, 4) => {
            for s in reader.into_samples::<i32>() {
                pcm.extend_from_slice(&s?.to_le_bytes());
            }
        }
        (SampleFormat::Float, 4) => {
            for s in reader.into_samples::<f32>() {
                pcm.extend_from_slice(&s?.to_le_bytes());
            }
        }
        (format, _) => {
            tracing::warn!(?format, bits = spec.bits_per_sample, "unsupported WAV sample layout");
            return Err(TtsError::AudioFormat(hound::Error::Unsupported));
        }
    }

    Ok(AudioResult {
        sample_rate: spec.sample_rate,
        sample_width: width,
        channels,
        pcm,
    })
}

/// Write 16-bit PCM samples as a WAV file.
pub fn write_pcm16_wav<P: AsRef<Path>>(
    path: P,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> TtsResult<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    // finalize() rewrites the header lengths
    writer.finalize()?;
    Ok(())
}
