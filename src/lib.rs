#![doc = include_str!("../README.md")]
pub mod app;
pub mod asr;
pub mod audio;
pub mod bot;
pub mod capture;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod recording;
pub mod transcript;
pub mod voice;
