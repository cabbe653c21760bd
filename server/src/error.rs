use thiserror::Error;

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed or unexpected event. Logged and skipped, never fatal.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("TTS error: {0}")]
    Tts(#[from] tts_core::TtsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Error code sent to clients in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "configuration-error",
            ServerError::Protocol(_) => "protocol-error",
            // A broken audio container counts as a failed synthesis
            ServerError::Tts(_) | ServerError::Internal(_) => "synthesis-failed",
            ServerError::Io(_) | ServerError::Json(_) => "internal-error",
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
