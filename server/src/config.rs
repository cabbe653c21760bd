// Process configuration, read once at startup

use std::path::PathBuf;

use clap::Parser;

use tts_core::{language_from_voice_id, SpeechEngine, SynthesisParams, Synthesizer};

use crate::error::{ServerError, ServerResult};
use crate::info::{DescriptorConfig, Info};
use crate::state::AppState;
use crate::transport::BindUri;

pub const DEFAULT_SAMPLES_PER_CHUNK: usize = 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "wyoming-tts")]
#[command(version, about = "Text-to-speech over the Wyoming protocol", long_about = None)]
pub struct ServerConfig {
    /// Voice to load, as listed in the voices map (e.g. piper/en_US/lessac-medium).
    /// Lists the available voices when omitted.
    #[arg(long, env = "TTS_VOICE")]
    pub voice: Option<String>,

    /// Speaker for multi-speaker voices
    #[arg(long, env = "TTS_SPEAKER")]
    pub speaker: Option<String>,

    /// Language for multi-lingual voices
    #[arg(long, env = "TTS_LANGUAGE")]
    pub language: Option<String>,

    /// Samples per audio-chunk event
    #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_CHUNK, env = "TTS_SAMPLES_PER_CHUNK")]
    pub samples_per_chunk: usize,

    /// unix:// or tcp://
    #[arg(long, env = "TTS_URI")]
    pub uri: String,

    /// Log DEBUG messages
    #[arg(long, env = "TTS_DEBUG")]
    pub debug: bool,

    /// Voice catalog mapping voice ids to model configs
    #[arg(long, default_value = "models/map.json", env = "TTS_VOICES_MAP")]
    pub voices_map: PathBuf,
}

/// Outcome of checking the loaded engine against the configuration.
#[derive(Debug)]
pub enum Startup {
    Ready(AppState),
    /// A required option is missing; the caller lists `available` and exits
    /// without binding.
    MissingOption {
        option: &'static str,
        available: Vec<String>,
    },
}

impl ServerConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            voice: None,
            speaker: None,
            language: None,
            samples_per_chunk: DEFAULT_SAMPLES_PER_CHUNK,
            uri: uri.into(),
            debug: false,
            voices_map: PathBuf::from("models/map.json"),
        }
    }

    pub fn bind_uri(&self) -> ServerResult<BindUri> {
        self.uri.parse()
    }

    /// Checks that do not need a loaded engine.
    pub fn validate(&self) -> ServerResult<()> {
        if self.samples_per_chunk == 0 {
            return Err(ServerError::Config(
                "--samples-per-chunk must be greater than zero".to_string(),
            ));
        }
        self.bind_uri()?;
        Ok(())
    }

    /// Language advertised for the voice: the configured one for
    /// multi-lingual engines, otherwise the language segment of the voice id.
    pub fn voice_language(&self, engine: &dyn SpeechEngine) -> ServerResult<Option<String>> {
        if engine.is_multi_lingual() {
            return Ok(self.language.clone());
        }
        let voice_id = self.voice_id()?;
        language_from_voice_id(voice_id)
            .map(|lang| Some(lang.to_string()))
            .ok_or_else(|| {
                ServerError::Config(format!(
                    "voice id '{voice_id}' has no language segment (expected namespace/language/name)"
                ))
            })
    }

    /// Build the shared state for `engine`, or report the option the
    /// operator still has to choose.
    pub fn prepare(&self, engine: Box<dyn SpeechEngine>) -> ServerResult<Startup> {
        self.validate()?;
        let voice_id = self.voice_id()?.to_string();

        if engine.is_multi_lingual() && self.language.is_none() {
            return Ok(Startup::MissingOption {
                option: "language",
                available: engine.languages(),
            });
        }
        if engine.is_multi_speaker() && self.speaker.is_none() {
            return Ok(Startup::MissingOption {
                option: "speaker",
                available: engine.speakers(),
            });
        }

        if let Some(language) = self.voice_language(engine.as_ref())? {
            tracing::info!(language = %language, "Using language");
        }

        let info = Info::build(&DescriptorConfig {
            program_name: engine.name().to_string(),
            attribution: engine.attribution().into(),
            multi_lingual: engine.is_multi_lingual(),
            multi_speaker: engine.is_multi_speaker(),
            languages: engine.languages(),
            speaker: self.speaker.clone(),
            voice_id,
        });

        let params = SynthesisParams::for_engine(
            engine.as_ref(),
            self.language.as_deref(),
            self.speaker.as_deref(),
        );
        let synth = Synthesizer::new(engine, params);

        Ok(Startup::Ready(AppState::new(
            info,
            synth,
            self.samples_per_chunk,
        )))
    }

    fn voice_id(&self) -> ServerResult<&str> {
        self.voice
            .as_deref()
            .ok_or_else(|| ServerError::Config("no voice configured".to_string()))
    }
}
