//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "framecut", about = "Local video trimming and thumbnail strips", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional tuning file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON progress events on stdout
    #[arg(long, global = true)]
    pub json_progress: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trim a time range and re-encode it
    Clip(ClipArgs),
    /// Generate a thumbnail strip as JPEG files
    Thumbs(ThumbsArgs),
    /// Show probed source metadata
    Inspect(InspectArgs),
}

/// Arguments for the clip command
#[derive(Args, Debug)]
pub struct ClipArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: String,

    /// End time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub end: String,

    /// Output container format
    #[arg(long, default_value = "webm")]
    pub format: String,

    /// Quality factor (0.1-1.0)
    #[arg(long, default_value = "0.8")]
    pub quality: f64,

    /// Target bitrate in bits per second
    #[arg(long, default_value = "2500000")]
    pub bitrate: u64,

    /// Output frame rate (default: detected from the source)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Output file path
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for the thumbs command
#[derive(Args, Debug)]
pub struct ThumbsArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Strip display width in pixels, thumbnail count follows from it
    #[arg(long, default_value = "1200", conflicts_with = "count")]
    pub width: u32,

    /// Exact thumbnail count (overrides --width)
    #[arg(long)]
    pub count: Option<usize>,

    /// Directory the JPEG files are written to
    #[arg(short, long)]
    pub out_dir: PathBuf,
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
