use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use transcord::app::App;
use transcord::config::Config;
use transcord::logging::init_logging;

/// Discord bot recording and transcribing what is said in voice channels.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file, defaults to <config dir>/transcord/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bot token, overrides DISCORD_TOKEN and the configuration
    #[arg(long)]
    token: Option<String>,

    /// Write the default configuration if the file is missing, then exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    if cli.write_default_config {
        let config = Config::load_or_write_default(cli.config.as_deref())
            .context("Writing default configuration")?;
        info!("Recordings go to {}", config.paths.recordings_dir.display());
        return Ok(());
    }

    let app = App::new(cli.config.as_deref(), cli.token.as_deref()).await?;
    app.run().await
}
