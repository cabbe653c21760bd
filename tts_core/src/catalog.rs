use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceEntry {
    /// Engine model config (for Piper: the `.onnx.json` next to the model)
    pub config: String,
    pub default_speaker: Option<String>,
}

/// Installed voices, keyed by `namespace/language/name` identifiers.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, VoiceEntry>,
}

impl VoiceCatalog {
    pub fn new(voices: BTreeMap<String, VoiceEntry>) -> Self {
        Self { voices }
    }

    /// Load from `models/map.json`
    /// Entries are either a config path string or `{ "config": ..., "default_speaker": ... }`
    pub fn new_from_mapfile<P: AsRef<Path>>(p: P) -> anyhow::Result<Self> {
        let text = fs::read_to_string(p.as_ref())
            .with_context(|| format!("Failed to load {}", p.as_ref().display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let json: serde_json::Value =
            serde_json::from_str(text).with_context(|| "voice map is not valid JSON")?;

        let obj = json
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("voice map must be a JSON object"))?;

        let mut voices = BTreeMap::new();
        for (voice_id, v) in obj {
            let entry = match v {
                serde_json::Value::String(path) => VoiceEntry {
                    config: path.clone(),
                    default_speaker: None,
                },
                serde_json::Value::Object(o) => {
                    let config = o
                        .get("config")
                        .and_then(|x| x.as_str())
                        .ok_or_else(|| anyhow::anyhow!("missing 'config' for voice {}", voice_id))?
                        .to_string();
                    let default_speaker = o
                        .get("default_speaker")
                        .and_then(|x| x.as_str())
                        .map(|s| s.to_string());
                    VoiceEntry {
                        config,
                        default_speaker,
                    }
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "invalid entry for voice {} (expected string or object)",
                        voice_id
                    ));
                }
            };
            voices.insert(voice_id.clone(), entry);
        }

        Ok(Self { voices })
    }

    /// Sorted voice identifiers
    pub fn list_voices(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }

    pub fn get(&self, voice_id: &str) -> anyhow::Result<&VoiceEntry> {
        self.voices.get(voice_id).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown voice '{}'. Available voices: {}",
                voice_id,
                self.list_voices().join(", ")
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

/// Language segment of a `namespace/language/...` voice identifier.
pub fn language_from_voice_id(voice_id: &str) -> Option<&str> {
    voice_id.split('/').nth(1).filter(|s| !s.is_empty())
}
