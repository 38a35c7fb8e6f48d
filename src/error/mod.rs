//! Error handling module for framecut

use thiserror::Error;

/// Main error type for framecut operations
#[derive(Error, Debug)]
pub enum ExportError {
    /// Trim range or encoder knobs rejected before any resource was opened
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Requested codec/resolution/bitrate combination rejected by the
    /// capability probe. Recovered internally by codec or pipeline fallback.
    #[error("Unsupported encoder configuration: {message}")]
    UnsupportedConfiguration { message: String },

    /// The frame-level encoder reported an internal error; fatal to the export
    #[error("Encode failure during {stage}: {message}")]
    EncodeFailure { stage: String, message: String },

    /// The real-time recorder reported an error; fatal to the export
    #[error("Capture failure: {message}")]
    CaptureFailure { message: String },

    /// Decoding the source produced no usable frame
    #[error("Decode failure: {message}")]
    DecodeFailure { message: String },

    /// Media metadata could not be read
    #[error("Failed to probe media source: {message}")]
    ProbeFailure { message: String },

    /// Operation cancelled cooperatively by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Tuning configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Background task failed to complete
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

impl ExportError {
    /// Shorthand for encode failures with a stage tag
    pub fn encode(stage: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::EncodeFailure {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        ExportError::CaptureFailure {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ExportError::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type alias for framecut operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;
