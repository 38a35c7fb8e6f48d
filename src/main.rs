//! framecut CLI
//!
//! Trim a time range out of a local video and re-encode it, or build a
//! thumbnail strip, entirely on this machine.
//!
//! ```bash
//! framecut clip --input video.mp4 --start 00:01:00 --end 00:02:00 --output cut.webm
//! framecut thumbs --input video.mp4 --out-dir thumbs/
//! framecut inspect --input video.mp4 --json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use framecut::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecut=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    framecut::media::init()?;

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Clip(args) => {
            info!("Executing clip command");
            commands::execute_clip(args, config, cli.json_progress).await?;
        }
        Commands::Thumbs(args) => {
            info!("Executing thumbs command");
            commands::execute_thumbs(args, config, cli.json_progress).await?;
        }
        Commands::Inspect(args) => {
            commands::execute_inspect(args).await?;
        }
    }

    Ok(())
}
