use env_logger::Builder;
use log::{LevelFilter, info};
use whisper_rs::install_logging_hooks;

/// Installs the process logger.
///
/// Only records from this crate are shown by default; `RUST_LOG` can widen
/// that (e.g. `RUST_LOG=songbird=debug`).
pub fn init_logging() {
    install_logging_hooks();

    #[cfg(debug_assertions)]
    let default_level = LevelFilter::Debug;
    #[cfg(not(debug_assertions))]
    let default_level = LevelFilter::Info;
    Builder::new()
        .filter_level(LevelFilter::Off)
        .filter_module("transcord", default_level)
        .parse_default_env()
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    info!("Logging system initialized");
}
