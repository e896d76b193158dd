//! Main application logic.
//!
//! This module wires the Discord client, the voice receive path and the
//! utterance worker that records and transcribes what was said.

use anyhow::{Context, Result};
use log::{debug, error, info};
use serenity::gateway::ActivityData;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use serenity::prelude::GatewayIntents;
use serenity::Client;
use songbird::driver::DecodeMode;
use songbird::{SerenityInit, Songbird};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;

use crate::asr::{Asr, download_model};
use crate::audio;
use crate::bot::Handler;
use crate::capture::{FlushDelay, Utterance};
use crate::config::Config;
use crate::recording;
use crate::transcript::Transcript;

/// Main application struct that coordinates all components.
pub struct App {
    config: Arc<Config>,
    token: String,
    asr: Option<Asr>,
    tx_utterance: UnboundedSender<Utterance>,
    rx_utterance: UnboundedReceiver<Utterance>,
}

/// Records, transcribes and publishes one utterance.
///
/// Failures of a single step are logged; later steps still run when they can.
async fn handle_utterance(
    asr: Option<&mut Asr>,
    config: &Config,
    http: &Arc<Http>,
    utterance: Utterance,
) -> Result<()> {
    let capture = &config.capture;
    if utterance.samples.len() < capture.min_utterance_samples() {
        debug!(
            "Dropping {}ms utterance from {}",
            audio::duration_ms(utterance.samples.len(), capture.sample_rate, capture.channels),
            utterance.speaker.name
        );
        return Ok(());
    }

    if config.recording.enabled {
        match recording::write(
            &utterance,
            &config.paths.recordings_dir,
            config.recording.format,
            capture.sample_rate,
            capture.channels,
        ) {
            Ok(path) => info!("Saved {}", path.display()),
            Err(err) => error!("Cannot save utterance of {}: {err}", utterance.speaker.name),
        }
    }

    let Some(asr) = asr else {
        return Ok(());
    };

    info!("Transcribing audio...");
    let samples =
        audio::to_whisper_input(&utterance.samples, capture.sample_rate, capture.channels)?;
    let text = tokio::task::block_in_place(|| asr.run(&samples, &config.model))
        .context("Error running ASR")?;

    let transcript = Transcript {
        speaker: utterance.speaker,
        started_at: utterance.started_at,
        text,
    };
    if transcript.is_empty() {
        debug!("No voice detected");
        return Ok(());
    }
    info!("{}", transcript.line());
    publish(&transcript, config, http, utterance.text_channel_id).await
}

/// Appends `transcript` to the transcript file and posts it to the chat.
async fn publish(
    transcript: &Transcript,
    config: &Config,
    http: &Arc<Http>,
    text_channel_id: u64,
) -> Result<()> {
    if let Some(path) = &config.paths.transcript_path {
        if let Err(err) = transcript.append(path) {
            error!("Cannot append transcript to {}: {err}", path.display());
        }
    }
    if config.transcript.post_to_channel {
        ChannelId::new(text_channel_id)
            .say(http, transcript.chat_message())
            .await
            .context("Posting transcript")?;
    }
    Ok(())
}

/// Handles utterances until `stop` fires, then drains what is already queued.
async fn run_worker(
    mut rx: UnboundedReceiver<Utterance>,
    mut asr: Option<Asr>,
    config: Arc<Config>,
    http: Arc<Http>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut stopping = false;
    loop {
        let next = if stopping {
            rx.recv().await
        } else {
            tokio::select! {
                next = rx.recv() => next,
                _ = &mut stop => {
                    debug!("Draining queued utterances");
                    rx.close();
                    stopping = true;
                    continue;
                }
            }
        };
        let Some(utterance) = next else {
            break;
        };
        if let Err(err) = handle_utterance(asr.as_mut(), &config, &http, utterance).await {
            error!("Error handling utterance {err:?}");
        }
    }
    debug!("Utterance worker stopped");
}

impl App {
    /// Creates a new App instance.
    ///
    /// This function:
    /// 1. Loads configuration from the given path, or the default one
    /// 2. Resolves the bot token
    /// 3. Prepares the output directories
    /// 4. Downloads the Whisper model when transcription is enabled
    pub async fn new(config_path: Option<&Path>, cli_token: Option<&str>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                Config::from_file(path).context(format!("Reading config {}", path.display()))?
            }
            None => Config::load_or_write_default(None)?,
        };

        let token = config.resolve_token(cli_token)?;

        std::fs::create_dir_all(&config.paths.cache_dir)
            .context("Creating cache directory")?;
        if config.recording.enabled {
            std::fs::create_dir_all(&config.paths.recordings_dir)
                .context("Creating recordings directory")?;
        }

        let asr = if config.model.enabled {
            let model_path = download_model(&config.model)
                .await
                .context("Failed to download model")?;
            info!("Using model {}", model_path.display());
            Some(Asr::new(&model_path))
        } else {
            info!("Transcription disabled");
            None
        };

        let (tx_utterance, rx_utterance) = unbounded_channel();
        Ok(Self {
            config: Arc::new(config),
            token,
            asr,
            tx_utterance,
            rx_utterance,
        })
    }

    /// Runs the bot until the gateway connection ends or Ctrl-C is pressed.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            token,
            asr,
            tx_utterance,
            rx_utterance,
        } = self;

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES;

        let delay = FlushDelay::new(Duration::from_millis(config.capture.flush_delay_ms));
        let voice = Songbird::serenity_from_config(
            songbird::Config::default().decode_mode(DecodeMode::Decode),
        );
        let handler = Arc::new(Handler::new(config.clone(), delay, tx_utterance, voice.clone()));

        let mut client = Client::builder(&token, intents)
            .event_handler_arc(handler.clone())
            .activity(ActivityData::listening(config.discord.activity.clone()))
            .status(config.discord.status.into())
            .register_songbird_with(voice)
            .await
            .context("Building Discord client")?;

        let (stop_worker, stop) = oneshot::channel();
        let worker = tokio::task::spawn(run_worker(
            rx_utterance,
            asr,
            config.clone(),
            client.http.clone(),
            stop,
        ));

        let shard_manager = client.shard_manager.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {err}");
                return;
            }
            info!("Shutting down");
            shard_manager.shutdown_all().await;
        });

        let result = client.start().await;

        // Hand over every open capture session before the worker drains.
        handler.shutdown().await;
        let _ = stop_worker.send(());
        if let Err(err) = worker.await {
            error!("Utterance worker failed: {err}");
        }

        result.context("Discord client stopped")?;
        info!("Done exiting");
        Ok(())
    }
}
