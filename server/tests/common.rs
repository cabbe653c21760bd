//! Common utilities for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use server::protocol::{read_event, write_event, Event};
use server::{Listener, ServerConfig, Startup};
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tts_core::{Attribution, SpeechEngine, SynthesisParams};

/// Engine writing a fixed 16-bit mono waveform and recording what it was asked.
pub struct FakeEngine {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub fail: bool,
    pub speakers: Vec<String>,
    pub calls: Arc<Mutex<Vec<(String, SynthesisParams)>>>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub delay: Duration,
    /// When set, each call reports on `started` and waits on `release`
    pub gate: Option<(Mutex<mpsc::Sender<()>>, Mutex<mpsc::Receiver<()>>)>,
}

impl FakeEngine {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            sample_rate: 22050,
            fail: false,
            speakers: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            gate: None,
        }
    }
}

impl SpeechEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake-tts"
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            name: "tests".to_string(),
            url: "https://example.invalid/tts".to_string(),
        }
    }

    fn languages(&self) -> Vec<String> {
        Vec::new()
    }

    fn speakers(&self) -> Vec<String> {
        self.speakers.clone()
    }

    fn synthesize_to_file(
        &self,
        text: &str,
        params: &SynthesisParams,
        output: &Path,
    ) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), params.clone()));

        if let Some((started, release)) = &self.gate {
            started.lock().unwrap().send(()).unwrap();
            release.lock().unwrap().recv().unwrap();
        }
        std::thread::sleep(self.delay);

        let result = if self.fail {
            Err(anyhow::anyhow!("engine failure"))
        } else {
            tts_core::wav::write_pcm16_wav(output, &self.samples, self.sample_rate, 1)
                .map_err(anyhow::Error::from)
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct TestServer {
    pub addr: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// Start a server for `engine` on an ephemeral local port.
pub async fn start_server(engine: FakeEngine, samples_per_chunk: usize) -> TestServer {
    let mut config = ServerConfig::new("tcp://127.0.0.1:0");
    config.voice = Some("fake/en/test-voice".to_string());
    config.samples_per_chunk = samples_per_chunk;
    if !engine.speakers.is_empty() {
        config.speaker = engine.speakers.first().cloned();
    }

    let app = match config.prepare(Box::new(engine)).unwrap() {
        Startup::Ready(app) => app,
        other => panic!("server not ready: {other:?}"),
    };

    let listener = Listener::bind(&config.bind_uri().unwrap()).await.unwrap();
    let addr = match listener.local_uri().unwrap() {
        server::BindUri::Tcp { host, port } => format!("{host}:{port}"),
        other => panic!("unexpected {other:?}"),
    };

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        listener
            .serve(app, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        shutdown: Some(tx),
        task,
    }
}

pub struct Client {
    reader: BufReader<ReadHalf<TcpStream>>,
    writer: WriteHalf<TcpStream>,
}

impl Client {
    pub async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    pub async fn send(&mut self, event: &Event) {
        write_event(&mut self.writer, event).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn recv(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(10), read_event(&mut self.reader))
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .expect("connection closed")
    }

    /// Assert the server ends the connection without sending anything.
    pub async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(Duration::from_secs(10), read_event(&mut self.reader))
            .await
            .expect("timed out waiting for close");
        assert!(matches!(next, Ok(None) | Err(_)), "unexpected {next:?}");
    }

    /// Read events up to and including `audio-stop` or `error`.
    pub async fn recv_response(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = self.recv().await;
            let done = event.is_type(server::protocol::AUDIO_STOP)
                || event.is_type(server::protocol::ERROR);
            events.push(event);
            if done {
                return events;
            }
        }
    }
}

pub fn synthesize(text: &str) -> Event {
    server::protocol::Synthesize {
        text: text.to_string(),
        voice: None,
    }
    .event()
    .unwrap()
}
