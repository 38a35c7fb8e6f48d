//! framecut
//!
//! Local video trimming with frame-accurate re-encoding and a real-time
//! capture fallback, plus batched thumbnail-strip generation.
//!
//! Exports run through one of two pipelines, selected once per request by
//! capability negotiation:
//!
//! - [`pipeline::DeterministicEncodePipeline`] samples and re-encodes every
//!   frame in the trim range into VP9/VP8-in-WebM, with exact frame counts
//!   and deterministic output.
//! - [`pipeline::RealTimeCapturePipeline`] plays the range against the wall
//!   clock and records what gets painted, used whenever frame-level
//!   encoding is unavailable or the target is not WebM.
//!
//! Both produce one complete [`domain::EncodedArtifact`] or an error, never
//! partial output. The [`pipeline::Exporter`] facade validates requests,
//! negotiates, and dispatches.

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod media;
pub mod negotiator;
pub mod pipeline;
pub mod progress;
pub mod sampler;
pub mod thumbs;

pub use config::Tuning;
pub use domain::{EncodedArtifact, RasterFrame, SourceMetadata, TranscodeRequest};
pub use error::{ExportError, ExportResult};
pub use pipeline::{ExportPipeline, Exporter};
pub use progress::{CancelToken, ProgressSink};
