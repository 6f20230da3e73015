//! Utterance - speak text through the configured speech engine

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utterance::config::Config;
use utterance::{engine, SpeechRequest, UtteranceEvent, Voice};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text to speak
    text: Option<String>,

    /// Speaking rate (0-10, 1 is normal)
    #[arg(short, long)]
    rate: Option<f32>,

    /// Pitch (0-3, 1 is natural)
    #[arg(short, long)]
    pitch: Option<f32>,

    /// Volume (0-1)
    #[arg(long)]
    volume: Option<f32>,

    /// Language code, e.g. en-US
    #[arg(short, long)]
    lang: Option<String>,

    /// Voice name from the engine's catalog
    #[arg(long)]
    voice: Option<String>,

    /// Engine to use (speechd, log); overrides the config file
    #[arg(short, long)]
    engine: Option<String>,

    /// List available voices instead of speaking
    #[arg(long)]
    list_voices: bool,

    /// Only list voices whose language contains this
    #[arg(long)]
    filter: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;

    // Setup logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };
    let filter = EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into());
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🗣️ Utterance v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Some(name) = &args.engine {
        config.engine = name.clone();
    }
    let engine = engine::create_engine(&config)
        .await
        .context("Failed to start speech engine")?;

    if args.list_voices {
        let voices = wait_for_voices(&SpeechRequest::new(engine), args.filter.as_deref()).await;
        for voice in voices {
            match &voice.variant {
                Some(variant) => println!("{}\t{}\t{}", voice.name, voice.language, variant),
                None => println!("{}\t{}", voice.name, voice.language),
            }
        }
        return Ok(());
    }

    let Some(text) = args.text else {
        warn!("Nothing to say; pass TEXT or --list-voices");
        return Ok(());
    };

    let mut request = SpeechRequest::from_config(engine, &config);
    request.set_text(text);
    if let Some(rate) = args.rate {
        request.set_rate(rate);
    }
    if let Some(pitch) = args.pitch {
        request.set_pitch(pitch);
    }
    if let Some(volume) = args.volume {
        request.set_volume(volume);
    }
    if let Some(lang) = args.lang {
        request.set_language(lang);
    }
    if let Some(name) = args.voice {
        let voice = request
            .voices(None)
            .into_iter()
            .find(|v| v.name == name)
            .unwrap_or_else(|| Voice::new(name, request.config().language().to_string()));
        request.set_voice(voice);
    }

    let done = Arc::new(Notify::new());
    let on_end = done.clone();
    let on_error = done.clone();
    request
        .set_on_start(|_| info!("▶️ Speaking"))
        .set_on_mark(|event| {
            if let UtteranceEvent::Mark { name } = event {
                info!("🔖 Reached mark '{}'", name);
            }
        })
        .set_on_end(move |_| {
            info!("✅ Finished");
            on_end.notify_one();
        })
        .set_on_error(move |event| {
            if let UtteranceEvent::Error(e) = event {
                error!("❌ Speech failed: {}", e);
            }
            on_error.notify_one();
        })
        .speak();

    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupted");
            request.cancel();
        }
    }

    Ok(())
}

/// Wait briefly for the engine to report its catalog
async fn wait_for_voices(request: &SpeechRequest, filter: Option<&str>) -> Vec<Voice> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let subscription = request.on_voices_changed(filter, move |voices| {
        let _ = tx.send(voices);
    });

    let voices = request.voices(filter);
    if !voices.is_empty() || request.engine().name() == "log" {
        subscription.cancel();
        return voices;
    }

    let voices = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    subscription.cancel();
    voices
}
