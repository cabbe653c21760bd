use std::path::Path;

use serde::Serialize;

/// Who made the engine, as advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub name: String,
    pub url: String,
}

/// Optional engine parameters.
///
/// `language` is only set for multi-lingual engines and `speaker` only for
/// multi-speaker ones; engines may reject parameters they do not expect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisParams {
    pub language: Option<String>,
    pub speaker: Option<String>,
}

impl SynthesisParams {
    /// Keep only the parameters `engine` accepts.
    pub fn for_engine(
        engine: &dyn SpeechEngine,
        language: Option<&str>,
        speaker: Option<&str>,
    ) -> Self {
        Self {
            language: language
                .filter(|_| engine.is_multi_lingual())
                .map(str::to_string),
            speaker: speaker
                .filter(|_| engine.is_multi_speaker())
                .map(str::to_string),
        }
    }
}

/// A text-to-speech engine that renders into a WAV file.
///
/// Implementations are not assumed to be reentrant; callers serialize
/// access.
pub trait SpeechEngine: Send + Sync {
    /// Program name advertised in capability info
    fn name(&self) -> &str;

    fn attribution(&self) -> Attribution;

    fn is_multi_lingual(&self) -> bool {
        !self.languages().is_empty()
    }

    fn is_multi_speaker(&self) -> bool {
        !self.speakers().is_empty()
    }

    /// Languages a multi-lingual engine accepts; empty otherwise.
    fn languages(&self) -> Vec<String>;

    /// Speakers a multi-speaker engine accepts; empty otherwise.
    fn speakers(&self) -> Vec<String>;

    fn synthesize_to_file(
        &self,
        text: &str,
        params: &SynthesisParams,
        output: &Path,
    ) -> anyhow::Result<()>;
}

#[cfg(feature = "piper")]
pub use piper::PiperEngine;

#[cfg(feature = "piper")]
mod piper {
    use std::{path::Path, sync::Arc};

    use anyhow::Context;
    use piper_rs::synth::PiperSpeechSynthesizer;

    use super::{Attribution, SpeechEngine, SynthesisParams};

    /// Piper voice loaded from its `.onnx.json` config.
    pub struct PiperEngine {
        synth: PiperSpeechSynthesizer,
        model: Arc<dyn piper_rs::PiperModel + Send + Sync>,
        speakers: Vec<(i64, String)>,
    }

    // Manual Debug implementation since PiperSpeechSynthesizer doesn't implement Debug
    impl std::fmt::Debug for PiperEngine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PiperEngine")
                .field("synth", &"<PiperSpeechSynthesizer>")
                .field("speakers", &self.speakers)
                .finish()
        }
    }

    impl PiperEngine {
        pub fn from_config_path<P: AsRef<Path>>(cfg_path: P) -> anyhow::Result<Self> {
            let model = piper_rs::from_config_path(cfg_path.as_ref())
                .map_err(|e| anyhow::anyhow!("piper load error: {e}"))
                .with_context(|| format!("loading {}", cfg_path.as_ref().display()))?;

            let mut speakers: Vec<(i64, String)> = match model.get_speakers() {
                Ok(Some(map)) => map.iter().map(|(id, name)| (*id, name.clone())).collect(),
                _ => Vec::new(),
            };
            speakers.sort();

            let synth = PiperSpeechSynthesizer::new(model.clone())
                .map_err(|e| anyhow::anyhow!("piper synth init error: {e}"))?;

            Ok(Self {
                synth,
                model,
                speakers,
            })
        }

        fn speaker_id(&self, speaker: &str) -> anyhow::Result<i64> {
            if let Some((id, _)) = self.speakers.iter().find(|(_, name)| name == speaker) {
                return Ok(*id);
            }
            // Numeric ids are accepted as well
            speaker.parse::<i64>().map_err(|_| {
                anyhow::anyhow!(
                    "Unknown speaker '{}'. Available speakers: {}",
                    speaker,
                    self.speakers().join(", ")
                )
            })
        }
    }

    impl SpeechEngine for PiperEngine {
        fn name(&self) -> &str {
            "piper"
        }

        fn attribution(&self) -> Attribution {
            Attribution {
                name: "rhasspy".to_string(),
                url: "https://github.com/rhasspy/piper".to_string(),
            }
        }

        // Piper voices are trained for a single language
        fn languages(&self) -> Vec<String> {
            Vec::new()
        }

        fn speakers(&self) -> Vec<String> {
            self.speakers.iter().map(|(_, name)| name.clone()).collect()
        }

        fn synthesize_to_file(
            &self,
            text: &str,
            params: &SynthesisParams,
            output: &Path,
        ) -> anyhow::Result<()> {
            if let Some(speaker) = params.speaker.as_deref() {
                let sid = self.speaker_id(speaker)?;
                if let Some(e) = self.model.set_speaker(sid) {
                    return Err(anyhow::anyhow!("piper speaker error: {e}"));
                }
            }

            self.synth
                .synthesize_to_file(output, text.to_string(), None)
                .map_err(|e| anyhow::anyhow!("piper synth error: {e}"))
        }
    }
}
