//! Domain layer: request/artifact value types and validation rules.

pub mod model;
pub mod rules;

pub use model::{
    snap_fps, EncodedArtifact, EncoderConfig, OutputFormat, RasterFrame, SourceMetadata, TimeSpec,
    TranscodeRequest, VideoCodec, BITRATE_STEP, MAX_BITRATE, MAX_QUALITY, MIN_BITRATE,
    MIN_QUALITY, SUPPORTED_FPS,
};
pub use rules::validate_request;
