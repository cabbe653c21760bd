use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use tts_core::{AudioResult, Synthesizer};

use crate::error::{ServerError, ServerResult};
use crate::info::Info;

/// Synthesizer shared by every connection.
///
/// Engines are not assumed to be reentrant, so calls are serialized by a
/// single mutex. Each call runs on the blocking pool so other connections
/// keep receiving events meanwhile.
#[derive(Debug, Clone)]
pub struct SharedSynthesizer {
    inner: Arc<Mutex<Synthesizer>>,
}

impl SharedSynthesizer {
    pub fn new(synth: Synthesizer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(synth)),
        }
    }

    pub async fn synthesize(&self, text: String) -> ServerResult<AudioResult> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || -> ServerResult<AudioResult> {
            let synth = inner.lock().map_err(|_| {
                ServerError::Internal(
                    "Synthesizer lock poisoned - a previous synthesis panicked".to_string(),
                )
            })?;
            Ok(synth.synthesize(&text)?)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Task join error: {e}")))?
    }
}

/// Everything a connection handler needs, cloned into each connection task.
#[derive(Debug, Clone)]
pub struct AppState {
    pub info: Arc<Info>,
    pub synth: SharedSynthesizer,
    pub samples_per_chunk: usize,
    pub request_count: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(info: Info, synth: Synthesizer, samples_per_chunk: usize) -> Self {
        Self {
            info: Arc::new(info),
            synth: SharedSynthesizer::new(synth),
            samples_per_chunk,
            request_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count a synthesis request, returning its 1-based sequence number.
    pub fn next_request(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}
