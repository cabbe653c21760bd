use clap::Parser;
use tracing::{error, info, warn};

use server::{Listener, ServerConfig, Startup};
use tts_core::{SpeechEngine, VoiceCatalog, VoiceEntry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let config = ServerConfig::parse();

    let filter = if config.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    async_main(config).await
}

async fn async_main(mut config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    let uri = config.bind_uri()?;

    let catalog = VoiceCatalog::new_from_mapfile(&config.voices_map).unwrap_or_else(|e| {
        warn!("Could not load {}: {e:#}, using empty voice map.", config.voices_map.display());
        VoiceCatalog::default()
    });

    let Some(voice_id) = config.voice.clone() else {
        info!("The following voices are available (specify with --voice [voice_id]):");
        for voice in catalog.list_voices() {
            info!("  {voice}");
        }
        return Ok(());
    };

    info!("Loading voice {voice_id}...");
    let entry = catalog.get(&voice_id)?;
    if config.speaker.is_none() {
        config.speaker = entry.default_speaker.clone();
    }
    let engine = load_engine(entry)?;

    let app = match config.prepare(engine)? {
        Startup::Ready(app) => app,
        Startup::MissingOption { option, available } => {
            error!("The following {option}s are available (specify with --{option} [{option}]):");
            info!("{}", available.join("\n"));
            return Ok(());
        }
    };
    info!("TTS ready");

    let listener = Listener::bind(&uri).await?;
    info!("Ready, listening on {}", listener.local_uri()?);

    listener
        .serve(app, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

#[cfg(feature = "piper")]
fn load_engine(entry: &VoiceEntry) -> anyhow::Result<Box<dyn SpeechEngine>> {
    Ok(Box::new(tts_core::PiperEngine::from_config_path(&entry.config)?))
}

#[cfg(not(feature = "piper"))]
fn load_engine(entry: &VoiceEntry) -> anyhow::Result<Box<dyn SpeechEngine>> {
    anyhow::bail!(
        "cannot load {}: built without a synthesis backend (enable the `piper` feature)",
        entry.config
    )
}
