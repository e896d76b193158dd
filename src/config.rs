//! Configuration management for the Transcord bot.
//!
//! This module provides functionality for loading and managing application
//! configuration, including the Discord connection, voice capture settings,
//! recording output and model parameters.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serenity::model::user::OnlineStatus;
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::Error;

/// Environment variable consulted for the bot token.
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// Key holding the bot token inside a `.properties` token file.
pub const TOKEN_PROPERTY: &str = "discord.bot_token";

/// Presence status shown while the bot is connected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Idle,
    Dnd,
    Invisible,
}

impl From<Status> for OnlineStatus {
    fn from(value: Status) -> Self {
        match value {
            Status::Online => OnlineStatus::Online,
            Status::Idle => OnlineStatus::Idle,
            Status::Dnd => OnlineStatus::DoNotDisturb,
            Status::Invisible => OnlineStatus::Invisible,
        }
    }
}

/// Discord connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Prefer the `DISCORD_TOKEN` environment variable.
    pub token: Option<String>,
    /// Java-style properties file holding `discord.bot_token`
    pub token_file: Option<PathBuf>,
    /// Prefix of chat commands (`!echo`, `!delay`, ...)
    pub command_prefix: String,
    /// Text shown as "Listening to ..."
    pub activity: String,
    pub status: Status,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: None,
            command_prefix: "!".to_string(),
            activity: "to jams".to_string(),
            status: Status::Dnd,
        }
    }
}

/// Voice capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct CaptureConfig {
    /// Silence after which a speaker's pending audio is flushed, in milliseconds
    pub flush_delay_ms: u64,
    /// How often pending audio is checked for expiry, in milliseconds
    pub poll_interval_ms: u64,
    /// Utterances shorter than this are discarded, in milliseconds
    pub min_utterance_ms: u64,
    /// Sample rate of the decoded voice packets in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels in the decoded voice packets
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 1000,
            poll_interval_ms: 50,
            min_utterance_ms: 200,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Number of interleaved samples making up `min_utterance_ms` of audio.
    pub fn min_utterance_samples(&self) -> usize {
        let per_ms = self.sample_rate as u64 * self.channels as u64;
        (per_ms * self.min_utterance_ms / 1000) as usize
    }
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct PathConfig {
    /// Cache directory for storing temporary files
    pub cache_dir: PathBuf,
    /// Directory receiving one file per utterance
    pub recordings_dir: PathBuf,
    /// File receiving one line per transcript, if set
    pub transcript_path: Option<PathBuf>,
}

impl Default for PathConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .context("Cannot find cache directory")
            .unwrap_or_else(|_| PathBuf::from("~/.cache"));
        let mut cache_dir = cache_dir;
        cache_dir.push("transcord");

        let mut recordings_dir = cache_dir.clone();
        recordings_dir.push("recordings");

        Self {
            cache_dir,
            recordings_dir,
            transcript_path: None,
        }
    }
}

/// On-disk encoding of recorded utterances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(rename_all = "lowercase")]
pub enum RecordingFormat {
    /// 16-bit PCM WAV file
    Wav,
    /// Headerless little-endian 16-bit PCM
    Raw,
}

/// Recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub format: RecordingFormat,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: RecordingFormat::Wav,
        }
    }
}

/// Type of prompt to use for the model
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PromptType {
    /// Use a list of vocabulary words joined by commas
    Vocabulary { vocabulary: Vec<String> },
    /// Use a custom initial prompt
    Raw { prompt: String },
    /// No prompt
    #[default]
    None,
}

impl PromptType {
    /// Gets the prompt text to use with the model
    pub fn get_prompt_text(&self) -> Option<String> {
        match self {
            PromptType::Vocabulary { vocabulary } if !vocabulary.is_empty() => {
                Some(vocabulary.join(", "))
            }
            PromptType::Raw { prompt } => Some(prompt.clone()),
            _ => None,
        }
    }
}

/// Whisper model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct ModelConfig {
    /// Transcribe utterances at all
    pub enabled: bool,
    /// Model repository on Hugging Face
    pub repo: String,
    /// Model filename
    pub filename: String,
    /// Spoken language, auto-detected when unset
    pub language: Option<String>,
    /// Keep the model in memory between utterances
    pub keep_loaded: bool,
    /// Type of prompt to use for the model
    pub prompt: PromptType,
    /// Map of text to replace with their replacements
    pub replacements: HashMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo: "ggerganov/whisper.cpp".to_string(),
            filename: "ggml-base.en.bin".to_string(),
            language: None,
            keep_loaded: true,
            prompt: PromptType::None,
            replacements: HashMap::new(),
        }
    }
}

/// Transcript publishing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct TranscriptConfig {
    /// Post each transcript to the text channel the join command came from
    pub post_to_channel: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub capture: CaptureConfig,
    pub paths: PathConfig,
    pub recording: RecordingConfig,
    pub model: ModelConfig,
    pub transcript: TranscriptConfig,
}

impl Config {
    /// Gets the default configuration file path.
    fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .context("Cannot find config directory")
            .unwrap_or_else(|_| PathBuf::from("~/.config"));
        let mut path = config_dir;
        path.push("transcord");
        path.push("config.toml");
        path
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Loads configuration from the default location, creating it if it doesn't exist.
    pub fn load_or_write_default(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_config_path();
        let path = path.unwrap_or(&default_path);
        // If config exists, use it
        if path.exists() {
            return Self::from_file(path)
                .context(format!("Reading default config from {}", path.display()));
        }

        // If no config exists, create default config
        let config = Self::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save_to_file(path)?;
        Ok(config)
    }

    /// Finds the bot token.
    ///
    /// Sources are tried in order: the command line, the `DISCORD_TOKEN`
    /// environment variable, `discord.token`, then `discord.token_file`.
    pub fn resolve_token(&self, cli_token: Option<&str>) -> Result<String, Error> {
        self.resolve_token_with_env(cli_token, std::env::var(TOKEN_ENV).ok())
    }

    fn resolve_token_with_env(
        &self,
        cli_token: Option<&str>,
        env_token: Option<String>,
    ) -> Result<String, Error> {
        let direct = cli_token
            .map(str::to_string)
            .or(env_token)
            .or_else(|| self.discord.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(token) = direct {
            return Ok(token);
        }
        match &self.discord.token_file {
            Some(path) => read_token_file(path),
            None => Err(Error::Config(format!(
                "No bot token: pass --token, set {TOKEN_ENV} or configure discord.token"
            ))),
        }
    }
}

/// Reads `discord.bot_token` from a Java-style properties file.
pub fn read_token_file(path: &Path) -> Result<String, Error> {
    let file = File::open(path)
        .map_err(|e| Error::Config(format!("Opening token file {}: {e}", path.display())))?;
    let properties = java_properties::read(BufReader::new(file))?;
    properties
        .get(TOKEN_PROPERTY)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            Error::Config(format!(
                "{TOKEN_PROPERTY} missing from {}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.discord.command_prefix, "!");
        assert_eq!(config.discord.activity, "to jams");
        assert_eq!(config.discord.status, Status::Dnd);
        assert_eq!(config.capture.flush_delay_ms, 1000);
        assert_eq!(config.capture.sample_rate, 48_000);
        assert_eq!(config.capture.channels, 2);
        assert_eq!(config.recording.format, RecordingFormat::Wav);
        assert_eq!(config.model.repo, "ggerganov/whisper.cpp");
        assert_eq!(config.model.filename, "ggml-base.en.bin");
        assert!(matches!(config.model.prompt, PromptType::None));
        assert!(config.model.replacements.is_empty());
        assert!(!config.transcript.post_to_channel);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("command_prefix = \"!\""));
        assert!(toml.contains("status = \"dnd\""));
        assert!(toml.contains("flush_delay_ms = 1000"));
        assert!(toml.contains("format = \"wav\""));
        assert!(toml.contains("repo = \"ggerganov/whisper.cpp\""));
        assert!(toml.contains("prompt"));
        assert!(toml.contains("replacements"));
        // Secrets are never written out by default.
        assert!(!toml.contains("token ="));
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [discord]
            command_prefix = "?"
            activity = "to the room"
            status = "idle"

            [capture]
            flush_delay_ms = 1500
            poll_interval_ms = 20

            [recording]
            format = "raw"

            [model]
            repo = "test/repo"
            filename = "test.bin"
            language = "fr"
            prompt = { type = "vocabulary", vocabulary = ["test", "words"] }
            replacements = { "incorrect" = "correct", "wrong" = "right" }

            [paths]
            cache_dir = "/tmp/test"
            recordings_dir = "/tmp/test/rec"
            transcript_path = "/tmp/test/transcript.log"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.discord.command_prefix, "?");
        assert_eq!(config.discord.status, Status::Idle);
        assert_eq!(config.capture.flush_delay_ms, 1500);
        assert_eq!(config.capture.poll_interval(), Duration::from_millis(20));
        // Unspecified fields keep their defaults.
        assert_eq!(config.capture.min_utterance_ms, 200);
        assert_eq!(config.recording.format, RecordingFormat::Raw);
        assert!(config.recording.enabled);
        assert_eq!(config.model.language.as_deref(), Some("fr"));
        assert_eq!(config.paths.recordings_dir, PathBuf::from("/tmp/test/rec"));
        assert_eq!(
            config.paths.transcript_path,
            Some(PathBuf::from("/tmp/test/transcript.log"))
        );
        assert_eq!(
            config.model.prompt.get_prompt_text(),
            Some("test, words".to_string())
        );
        assert_eq!(
            config.model.replacements.get("wrong"),
            Some(&"right".to_string())
        );
    }

    #[test]
    fn test_partial_paths_section() {
        let toml = r#"
            [paths]
            transcript_path = "/tmp/transcript.log"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let defaults = PathConfig::default();
        assert_eq!(
            config.paths.transcript_path,
            Some(PathBuf::from("/tmp/transcript.log"))
        );
        assert_eq!(config.paths.cache_dir, defaults.cache_dir);
        assert_eq!(config.paths.recordings_dir, defaults.recordings_dir);
    }

    #[test]
    fn test_prompt_type() {
        let prompt = PromptType::Vocabulary {
            vocabulary: vec!["word1".to_string(), "word2".to_string()],
        };
        assert_eq!(prompt.get_prompt_text(), Some("word1, word2".to_string()));

        let prompt = PromptType::Raw {
            prompt: "custom prompt".to_string(),
        };
        assert_eq!(prompt.get_prompt_text(), Some("custom prompt".to_string()));

        assert_eq!(PromptType::None.get_prompt_text(), None);

        let prompt = PromptType::Vocabulary { vocabulary: vec![] };
        assert_eq!(prompt.get_prompt_text(), None);
    }

    #[test]
    fn test_invalid_prompt() {
        let toml = r#"
            [model]
            prompt = { type = "Vocabulary", value = ["test", "words"] }
        "#;

        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config() {
        let toml = r#"
            [capture]
            flush_delay_ms = "soon"
        "#;

        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_min_utterance_samples() {
        let capture = CaptureConfig::default();
        // 200ms of 48kHz stereo.
        assert_eq!(capture.min_utterance_samples(), 19_200);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.discord.command_prefix = ">".to_string();
        config.capture.flush_delay_ms = 2500;
        config.recording.format = RecordingFormat::Raw;
        config.model.prompt = PromptType::Vocabulary {
            vocabulary: vec!["test".to_string(), "words".to_string()],
        };
        config.paths.transcript_path = Some(PathBuf::from("/tmp/test/transcript.log"));

        config.save_to_file(&config_path).unwrap();
        let loaded_config = Config::from_file(&config_path).unwrap();

        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_config_creation() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("transcord").join("config.toml");

        let config = Config::load_or_write_default(Some(&config_path)).unwrap();

        assert!(config_path.exists());
        assert_eq!(config.capture.flush_delay_ms, 1000);
        assert_eq!(config.model.filename, "ggml-base.en.bin");
    }

    #[test]
    fn test_token_resolution_order() {
        let mut config = Config::default();
        config.discord.token = Some("from-config".to_string());

        let token = config
            .resolve_token_with_env(Some("from-cli"), Some("from-env".to_string()))
            .unwrap();
        assert_eq!(token, "from-cli");

        let token = config
            .resolve_token_with_env(None, Some("from-env".to_string()))
            .unwrap();
        assert_eq!(token, "from-env");

        let token = config.resolve_token_with_env(None, None).unwrap();
        assert_eq!(token, "from-config");
    }

    #[test]
    fn test_token_from_properties_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("discord.properties");
        std::fs::write(
            &path,
            "# bot credentials\ndiscord.bot_token = abc.def.ghi\nother=value\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.discord.token_file = Some(path);
        let token = config.resolve_token_with_env(None, None).unwrap();
        assert_eq!(token, "abc.def.ghi");
    }

    #[test]
    fn test_missing_token() {
        let config = Config::default();
        let err = config.resolve_token_with_env(None, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("discord.properties");
        std::fs::write(&path, "other=value\n").unwrap();
        let mut config = Config::default();
        config.discord.token_file = Some(path);
        assert!(matches!(
            config.resolve_token_with_env(None, None),
            Err(Error::Config(_))
        ));
    }
}
