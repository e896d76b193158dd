//! Error types for the Transcord bot.
//!
//! This module defines the custom error types used throughout the application.
//! It uses the `thiserror` crate to derive error implementations and provides
//! convenient conversions from common error types.

use thiserror::Error;

/// Custom error type for the Transcord bot.
///
/// This enum represents the failures the library modules report: bad
/// configuration, voice connection problems and failures while persisting
/// recordings or transcripts.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to application configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error related to joining or leaving a voice channel
    #[error("Voice connection error: {0}")]
    Voice(String),

    /// Error while encoding an utterance to disk
    #[error("Recording error: {0}")]
    Recording(String),

    /// Error related to file system operations
    #[error("File system error: {0}")]
    FileSystem(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::FileSystem(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(err) => Error::FileSystem(err.to_string()),
            other => Error::Recording(other.to_string()),
        }
    }
}

impl From<java_properties::PropertiesError> for Error {
    fn from(err: java_properties::PropertiesError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<songbird::error::JoinError> for Error {
    fn from(err: songbird::error::JoinError) -> Self {
        Error::Voice(err.to_string())
    }
}
