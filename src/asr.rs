//! Whisper model integration for speech recognition.
//!
//! This module provides functionality for downloading and running the Whisper model
//! for speech-to-text transcription of captured utterances.

use anyhow::{Context, Result, anyhow};
use hf_hub::api::tokio::ApiBuilder;
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use crate::config::ModelConfig;

/// Downloads the Whisper model from Hugging Face Hub.
///
/// This function fetches the model from the configured repository and filename.
/// The model is cached locally after the first download.
pub async fn download_model(config: &ModelConfig) -> Result<PathBuf> {
    let api = ApiBuilder::from_env().build()?;
    let repo = api.model(config.repo.clone());
    let filename = repo
        .get(&config.filename)
        .await
        .context(format!("Fetching {} from {}", config.filename, config.repo))?;
    Ok(filename)
}

pub struct Asr {
    model_path: PathBuf,
    context: Option<(WhisperContext, WhisperState)>,
}

impl Asr {
    pub fn new(model_path: &Path) -> Self {
        Self {
            model_path: model_path.to_path_buf(),
            context: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.context.is_some()
    }

    pub fn load(&mut self) -> Result<()> {
        debug!("Trying to load model {}", self.model_path.display());
        let context = WhisperContext::new_with_params(
            &self.model_path.to_string_lossy(),
            WhisperContextParameters::default(),
        )
        .context(format!("Loading model at {}", self.model_path.display()))?;
        let state = context.create_state().context("Creating state")?;
        self.context = Some((context, state));
        info!("Context loaded");
        Ok(())
    }

    /// Runs the Whisper model on 16kHz mono samples and returns the text.
    ///
    /// The model is loaded on demand. Unless `keep_loaded` is set it is
    /// released again afterwards, freeing the accelerator's memory.
    pub fn run(&mut self, samples: &[f32], config: &ModelConfig) -> Result<String> {
        if !self.is_loaded() {
            self.load()?;
        }
        let (context, mut state) = self.context.take().ok_or(anyhow!("Context was not warm"))?;
        let prompt = config.prompt.get_prompt_text();

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(config.language.as_deref());

        if let Some(prompt) = &prompt {
            params.set_initial_prompt(prompt);
        }

        state.full(params, samples).context("Running model")?;

        let num_segments = state.full_n_segments()?;
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            segments.push(state.full_get_segment_text(i)?);
        }

        if config.keep_loaded {
            self.context = Some((context, state));
        }

        Ok(postprocess(&segments, &config.replacements))
    }
}

/// Joins segment texts and applies the configured replacements.
pub fn postprocess(segments: &[String], replacements: &HashMap<String, String>) -> String {
    let mut text = String::new();
    for segment in segments {
        text.push_str(segment.trim());
        text.push(' ');
    }
    let mut text = text.trim().to_string();

    for (from, to) in replacements {
        text = text.replace(from, to);
    }

    text
}
