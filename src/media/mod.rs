//! FFmpeg-backed adapters for the decode, encode, record and probe seams.

pub mod engine;
pub mod probe;
pub mod recorder;
pub mod source;

pub use engine::FfmpegEncoderFactory;
pub use probe::FfmpegProbe;
pub use recorder::FfmpegRecorderFactory;
pub use source::{FfmpegSource, FfmpegSourceFactory};

use std::sync::OnceLock;

use crate::error::{ExportError, ExportResult};

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize libav once per process. Safe to call repeatedly.
pub fn init() -> ExportResult<()> {
    INIT.get_or_init(|| ffmpeg_next::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|message| ExportError::Runtime {
            message: format!("FFmpeg initialization failed: {message}"),
        })
}
