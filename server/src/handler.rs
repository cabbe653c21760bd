//! Per-connection event handling.

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

use tts_core::chunk_audio;

use crate::error::{ServerError, ServerResult};
use crate::protocol::{
    audio_chunk, audio_start, audio_stop, error_event, read_event, write_event, AudioFormat,
    Event, Synthesize, DESCRIBE, SYNTHESIZE,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Dispatching,
    Describing,
    Synthesizing,
}

/// Dispatches the events of one connection and writes the responses back.
///
/// Requests are handled one at a time, so the responses of a request are
/// never interleaved with those of another. The handler never closes the
/// connection.
pub struct ConnectionHandler<W> {
    app: AppState,
    writer: W,
    info_event: Event,
    state: HandlerState,
}

impl<W> ConnectionHandler<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(app: AppState, writer: W) -> ServerResult<Self> {
        let info_event = app.info.event()?;
        Ok(Self {
            app,
            writer,
            info_event,
            state: HandlerState::Idle,
        })
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Handle one incoming event.
    ///
    /// Only write failures are returned; failed requests are reported to
    /// the client and unknown events are ignored.
    pub async fn handle_event(&mut self, event: Event) -> ServerResult<()> {
        self.state = HandlerState::Dispatching;

        let result = match event.event_type.as_str() {
            DESCRIBE => {
                self.state = HandlerState::Describing;
                self.describe().await
            }
            SYNTHESIZE => {
                self.state = HandlerState::Synthesizing;
                self.synthesize(&event).await
            }
            other => {
                warn!(event_type = other, "Unexpected event");
                Ok(())
            }
        };

        self.state = HandlerState::Idle;
        result
    }

    async fn describe(&mut self) -> ServerResult<()> {
        write_event(&mut self.writer, &self.info_event).await?;
        debug!("Sent info");
        Ok(())
    }

    async fn synthesize(&mut self, event: &Event) -> ServerResult<()> {
        let request: Synthesize = match event.parse_data() {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed synthesize event");
                return Ok(());
            }
        };
        if let Some(voice) = &request.voice {
            debug!(?voice, "Voice hint ignored; using configured voice");
        }

        let text = request.text.trim().to_string();
        let request_no = self.app.next_request();
        info!(request = request_no, text_len = text.len(), "Synthesize request");

        let samples_per_chunk = self.app.samples_per_chunk;
        let prepared = self.app.synth.synthesize(text).await.and_then(|audio| {
            let format = AudioFormat {
                rate: audio.sample_rate,
                width: audio.sample_width,
                channels: audio.channels,
            };
            Ok((format, chunk_audio(audio, samples_per_chunk)?))
        });

        // Nothing has been written for this request yet, so a failure is
        // reported as a single error event instead of a truncated stream.
        let (format, chunks) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(request = request_no, error = %e, "Synthesis failed");
                let reply = error_event(e.to_string(), e.code())?;
                return write_event(&mut self.writer, &reply).await;
            }
        };

        write_event(&mut self.writer, &audio_start(format)?).await?;

        let mut frames = 0usize;
        for frame in chunks {
            write_event(&mut self.writer, &audio_chunk(frame)?).await?;
            frames += 1;
        }

        write_event(&mut self.writer, &audio_stop()).await?;
        debug!(request = request_no, frames, "Completed request");
        Ok(())
    }
}

/// Read events from `stream` until the peer disconnects.
///
/// Protocol errors are logged and skipped; an I/O error ends the
/// connection.
pub async fn serve_connection<S>(stream: S, app: AppState) -> ServerResult<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut handler = ConnectionHandler::new(app, write_half)?;

    loop {
        match read_event(&mut reader).await {
            Ok(Some(event)) => handler.handle_event(event).await?,
            Ok(None) => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(ServerError::Protocol(msg)) => {
                warn!(error = %msg, "Ignoring malformed event");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tts_core::{Attribution, SpeechEngine, SynthesisParams, Synthesizer};

    use crate::info::{DescriptorConfig, Info};
    use crate::protocol::{
        AudioFormat, ErrorMessage, AUDIO_CHUNK, AUDIO_START, AUDIO_STOP, ERROR, INFO,
    };

    struct FakeEngine {
        samples: Vec<i16>,
        fail: bool,
        texts: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }
        fn attribution(&self) -> Attribution {
            Attribution {
                name: "fake".into(),
                url: "https://example.invalid".into(),
            }
        }
        fn languages(&self) -> Vec<String> {
            Vec::new()
        }
        fn speakers(&self) -> Vec<String> {
            Vec::new()
        }
        fn synthesize_to_file(
            &self,
            text: &str,
            _params: &SynthesisParams,
            output: &Path,
        ) -> anyhow::Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            if self.fail {
                anyhow::bail!("voice model missing");
            }
            tts_core::wav::write_pcm16_wav(output, &self.samples, 22050, 1)?;
            Ok(())
        }
    }

    fn app(samples: Vec<i16>, fail: bool, samples_per_chunk: usize) -> (AppState, Arc<Mutex<Vec<String>>>) {
        let texts = Arc::new(Mutex::new(Vec::new()));
        let engine = FakeEngine {
            samples,
            fail,
            texts: texts.clone(),
        };
        let info = Info::build(&DescriptorConfig {
            program_name: engine.name().to_string(),
            attribution: engine.attribution().into(),
            multi_lingual: false,
            multi_speaker: false,
            languages: Vec::new(),
            speaker: None,
            voice_id: "fake/en/test".to_string(),
        });
        let synth = Synthesizer::new(Box::new(engine), SynthesisParams::default());
        (AppState::new(info, synth, samples_per_chunk), texts)
    }

    async fn decode(bytes: Vec<u8>) -> Vec<Event> {
        let mut reader = BufReader::new(&bytes[..]);
        let mut events = Vec::new();
        while let Some(event) = read_event(&mut reader).await.unwrap() {
            events.push(event);
        }
        events
    }

    fn synthesize(text: &str) -> Event {
        Synthesize {
            text: text.to_string(),
            voice: None,
        }
        .event()
        .unwrap()
    }

    #[tokio::test]
    async fn test_describe_writes_info() {
        let (app, _) = app(vec![], false, 1024);
        let expected = app.info.event().unwrap();
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(Event::new(DESCRIBE)).await.unwrap();
        assert_eq!(handler.state(), HandlerState::Idle);

        let events = decode(handler.into_writer()).await;
        assert_eq!(events, vec![expected]);
    }

    #[tokio::test]
    async fn test_synthesize_streams_start_chunks_stop() {
        // 1250 samples * 2 bytes = 2500 bytes -> 2048 + 452 with 1024-sample chunks
        let (app, texts) = app(vec![7; 1250], false, 1024);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(synthesize("  Hello world  ")).await.unwrap();
        assert_eq!(handler.state(), HandlerState::Idle);
        assert_eq!(*texts.lock().unwrap(), vec!["Hello world".to_string()]);

        let events = decode(handler.into_writer()).await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec![AUDIO_START, AUDIO_CHUNK, AUDIO_CHUNK, AUDIO_STOP]);

        let start: AudioFormat = events[0].parse_data().unwrap();
        assert_eq!(
            start,
            AudioFormat {
                rate: 22050,
                width: 2,
                channels: 1
            }
        );
        assert_eq!(events[1].payload.as_ref().unwrap().len(), 2048);
        assert_eq!(events[2].payload.as_ref().unwrap().len(), 452);
        let chunk: AudioFormat = events[2].parse_data().unwrap();
        assert_eq!(chunk, start);
        assert!(events[3].data.is_empty());
        assert!(events[3].payload.is_none());
    }

    #[tokio::test]
    async fn test_empty_audio_still_brackets_stream() {
        let (app, _) = app(vec![], false, 1024);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(synthesize("")).await.unwrap();

        let events = decode(handler.into_writer()).await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec![AUDIO_START, AUDIO_STOP]);
    }

    #[tokio::test]
    async fn test_engine_failure_reports_error_event() {
        let (app, _) = app(vec![], true, 1024);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(synthesize("Hello")).await.unwrap();
        handler.handle_event(Event::new(DESCRIBE)).await.unwrap();
        assert_eq!(handler.state(), HandlerState::Idle);

        let events = decode(handler.into_writer()).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_type(ERROR));
        let msg: ErrorMessage = events[0].parse_data().unwrap();
        assert_eq!(msg.code.as_deref(), Some("synthesis-failed"));
        assert!(msg.text.contains("voice model missing"));
        assert!(events[1].is_type(INFO));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_reports_error_event() {
        let (app, _) = app(vec![1, 2, 3], false, 0);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(synthesize("Hello")).await.unwrap();

        let events = decode(handler.into_writer()).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_type(ERROR));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_events_are_ignored() {
        let (app, texts) = app(vec![1], false, 1024);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(Event::new("transcribe")).await.unwrap();
        handler.handle_event(Event::new(SYNTHESIZE)).await.unwrap();
        assert_eq!(handler.state(), HandlerState::Idle);
        assert!(texts.lock().unwrap().is_empty());

        let events = decode(handler.into_writer()).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_describe_unaffected_by_prior_synthesis() {
        let (app, _) = app(vec![5; 100], false, 16);
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(Event::new(DESCRIBE)).await.unwrap();
        handler.handle_event(synthesize("first")).await.unwrap();
        handler.handle_event(Event::new(DESCRIBE)).await.unwrap();

        let events = decode(handler.into_writer()).await;
        let infos: Vec<&Event> = events.iter().filter(|e| e.is_type(INFO)).collect();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0], infos[1]);
        assert!(events.last().unwrap().is_type(INFO));
    }

    #[tokio::test]
    async fn test_request_counter() {
        let (app, _) = app(vec![1], false, 1024);
        let counter = app.request_count.clone();
        let mut handler = ConnectionHandler::new(app, Vec::new()).unwrap();

        handler.handle_event(synthesize("one")).await.unwrap();
        handler.handle_event(synthesize("two")).await.unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_serve_connection_skips_garbage_and_ends_on_eof() {
        let (app, _) = app(vec![1, 2], false, 1024);
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve_connection(server, app));

        let (client_read, mut client_write) = tokio::io::split(client);
        use tokio::io::AsyncWriteExt;
        client_write.write_all(b"not an event\n").await.unwrap();
        write_event(&mut client_write, &Event::new(DESCRIBE)).await.unwrap();

        let mut reader = BufReader::new(client_read);
        let reply = read_event(&mut reader).await.unwrap().unwrap();
        assert!(reply.is_type(INFO));

        client_write.shutdown().await.unwrap();
        drop(client_write);
        task.await.unwrap().unwrap();
    }
}
