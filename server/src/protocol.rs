//! Wyoming event framing and the event types this service speaks.
//!
//! Each event is a single JSON header line, optionally followed by
//! `data_length` bytes of JSON data and `payload_length` bytes of binary
//! payload:
//!
//! ```text
//! {"type": "audio-chunk", "version": "1.5.2", "data_length": 41, "payload_length": 2048}\n
//! {"rate": 22050, "width": 2, "channels": 1}<2048 bytes of PCM>
//! ```
//!
//! Older peers put the data object inline in the header under `"data"`;
//! both forms are accepted on read, only the length-prefixed form is
//! written.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tts_core::AudioFrame;

use crate::error::{ServerError, ServerResult};

/// Protocol version written in every header.
pub const PROTOCOL_VERSION: &str = "1.5.2";

pub const DESCRIBE: &str = "describe";
pub const INFO: &str = "info";
pub const SYNTHESIZE: &str = "synthesize";
pub const AUDIO_START: &str = "audio-start";
pub const AUDIO_CHUNK: &str = "audio-chunk";
pub const AUDIO_STOP: &str = "audio-stop";
pub const ERROR: &str = "error";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub data: Map<String, Value>,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing)]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Attach `data`, which must serialize to a JSON object.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> ServerResult<Self> {
        match serde_json::to_value(data)? {
            Value::Object(map) => self.data = map,
            other => {
                return Err(ServerError::Internal(format!(
                    "event data must be an object, got {other}"
                )))
            }
        }
        Ok(self)
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Decode the data object into a typed message.
    pub fn parse_data<T: DeserializeOwned>(&self) -> ServerResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            ServerError::protocol(format!("invalid '{}' data: {e}", self.event_type))
        })
    }
}

/// Longest header line accepted, newline included.
pub const MAX_HEADER_LENGTH: usize = 64 * 1024;
/// Largest `data_length` accepted.
pub const MAX_DATA_LENGTH: usize = 1024 * 1024;
/// Largest `payload_length` accepted.
pub const MAX_PAYLOAD_LENGTH: usize = 16 * 1024 * 1024;

/// Read the next event.
///
/// Returns `Ok(None)` on a clean end of stream. A header that is not valid
/// JSON (or not UTF-8), or data that is not a JSON object, yields
/// [`ServerError::Protocol`] after the whole frame has been consumed, so the
/// caller can keep reading.
///
/// A header line longer than [`MAX_HEADER_LENGTH`] or a length above
/// [`MAX_DATA_LENGTH`] / [`MAX_PAYLOAD_LENGTH`] is an I/O error: the frame
/// cannot be skipped, so the connection has to end.
pub async fn read_event<R>(reader: &mut R) -> ServerResult<Option<Event>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let header = loop {
        line.clear();
        let bytes_read = (&mut *reader)
            .take(MAX_HEADER_LENGTH as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if bytes_read == 0 {
            return Ok(None);
        }
        if line.len() >= MAX_HEADER_LENGTH && line.last() != Some(&b'\n') {
            return Err(frame_too_large(format!(
                "event header exceeds {MAX_HEADER_LENGTH} bytes"
            )));
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        break serde_json::from_slice::<Header>(&line)
            .map_err(|e| ServerError::protocol(format!("invalid event header: {e}")))?;
    };

    let data_length = header.data_length.unwrap_or(0);
    if data_length > MAX_DATA_LENGTH {
        return Err(frame_too_large(format!(
            "'{}' data_length {data_length} exceeds {MAX_DATA_LENGTH}",
            header.event_type
        )));
    }
    let payload_length = header.payload_length.unwrap_or(0);
    if payload_length > MAX_PAYLOAD_LENGTH {
        return Err(frame_too_large(format!(
            "'{}' payload_length {payload_length} exceeds {MAX_PAYLOAD_LENGTH}",
            header.event_type
        )));
    }

    let mut data = header.data.unwrap_or_default();

    let mut data_bytes = vec![0u8; data_length];
    reader.read_exact(&mut data_bytes).await?;

    let payload = if payload_length > 0 {
        let mut payload = vec![0u8; payload_length];
        reader.read_exact(&mut payload).await?;
        Some(payload)
    } else {
        None
    };

    if !data_bytes.is_empty() {
        match serde_json::from_slice::<Value>(&data_bytes) {
            Ok(Value::Object(extra)) => data.extend(extra),
            Ok(_) => {
                return Err(ServerError::protocol(format!(
                    "'{}' data is not a JSON object",
                    header.event_type
                )))
            }
            Err(e) => {
                return Err(ServerError::protocol(format!(
                    "invalid '{}' data: {e}",
                    header.event_type
                )))
            }
        }
    }

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

fn frame_too_large(msg: String) -> ServerError {
    ServerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// Write one event and flush it.
pub async fn write_event<W>(writer: &mut W, event: &Event) -> ServerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let data_bytes = if event.data.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(&event.data)?
    };
    let payload_len = event.payload.as_ref().map_or(0, Vec::len);

    let header = Header {
        event_type: event.event_type.clone(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data: None,
        data_length: (!data_bytes.is_empty()).then_some(data_bytes.len()),
        payload_length: (payload_len > 0).then_some(payload_len),
    };

    let mut frame = serde_json::to_vec(&header)?;
    frame.push(b'\n');
    frame.extend_from_slice(&data_bytes);
    if let Some(payload) = &event.payload {
        frame.extend_from_slice(payload);
    }

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Typed messages
// ---------------------------------------------------------------------------

/// Voice hint a client may attach to `synthesize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizeVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesize {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
}

impl Synthesize {
    pub fn event(&self) -> ServerResult<Event> {
        Event::new(SYNTHESIZE).with_data(self)
    }
}

/// Format fields shared by `audio-start` and `audio-chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
}

pub fn audio_start(format: AudioFormat) -> ServerResult<Event> {
    Event::new(AUDIO_START).with_data(&format)
}

pub fn audio_chunk(frame: AudioFrame) -> ServerResult<Event> {
    let format = AudioFormat {
        rate: frame.sample_rate,
        width: frame.sample_width,
        channels: frame.channels,
    };
    Ok(Event::new(AUDIO_CHUNK)
        .with_data(&format)?
        .with_payload(frame.audio))
}

pub fn audio_stop() -> Event {
    Event::new(AUDIO_STOP)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub fn error_event(text: impl Into<String>, code: &str) -> ServerResult<Event> {
    Event::new(ERROR).with_data(&ErrorMessage {
        text: text.into(),
        code: Some(code.to_string()),
    })
}
