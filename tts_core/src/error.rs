use thiserror::Error;

/// Errors raised while turning text into streamable audio.
#[derive(Debug, Error)]
pub enum TtsError {
    /// Invalid startup or streaming parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The engine failed to produce audio.
    #[error("synthesis failed: {0:#}")]
    Synthesis(#[source] anyhow::Error),

    /// The engine output could not be parsed as a WAV container.
    #[error("invalid audio container: {0}")]
    AudioFormat(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TtsResult<T> = Result<T, TtsError>;

impl TtsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
