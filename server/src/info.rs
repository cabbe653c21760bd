//! Capability descriptor sent in reply to `describe`.

use serde::{Deserialize, Serialize};

use tts_core::language_from_voice_id;

use crate::error::ServerResult;
use crate::protocol::{Event, INFO};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

impl From<tts_core::Attribution> for Attribution {
    fn from(a: tts_core::Attribution) -> Self {
        Self {
            name: a.name,
            url: a.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    pub attribution: Attribution,
    pub installed: bool,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    pub attribution: Attribution,
    pub installed: bool,
    pub voices: Vec<TtsVoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub tts: Vec<TtsProgram>,
}

/// Inputs for [`Info::build`], taken from the loaded engine and the
/// process configuration.
#[derive(Debug, Clone)]
pub struct DescriptorConfig {
    pub program_name: String,
    pub attribution: Attribution,
    pub multi_lingual: bool,
    pub multi_speaker: bool,
    /// Every language a multi-lingual engine accepts
    pub languages: Vec<String>,
    /// Configured speaker, only meaningful when `multi_speaker`
    pub speaker: Option<String>,
    /// `namespace/language/name` identifier of the loaded voice
    pub voice_id: String,
}

impl Info {
    /// Build the descriptor. Only the configured speaker is advertised, so
    /// there is always exactly one voice.
    pub fn build(config: &DescriptorConfig) -> Self {
        let voice_name = match (config.multi_speaker, config.speaker.as_deref()) {
            (true, Some(speaker)) => speaker.to_string(),
            _ => "Default".to_string(),
        };

        let languages = if config.multi_lingual {
            config.languages.clone()
        } else {
            language_from_voice_id(&config.voice_id)
                .map(|lang| vec![lang.to_string()])
                .unwrap_or_default()
        };

        let voices = vec![TtsVoice {
            name: voice_name,
            attribution: config.attribution.clone(),
            installed: true,
            languages,
        }];

        Self {
            tts: vec![TtsProgram {
                name: config.program_name.clone(),
                attribution: config.attribution.clone(),
                installed: true,
                voices,
            }],
        }
    }

    pub fn event(&self) -> ServerResult<Event> {
        Event::new(INFO).with_data(self)
    }
}
