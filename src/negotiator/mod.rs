//! Pipeline and codec negotiation.
//!
//! Runs once per export, before any encoder is opened. The outcome is a
//! single decision the orchestrator dispatches on; no capability checks
//! happen later in the hot path.

use tracing::{debug, info};

use crate::domain::model::{EncoderConfig, OutputFormat, TranscodeRequest, VideoCodec};

/// Which of the two export strategies will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    DeterministicEncode,
    RealTimeCapture,
}

/// Capability surface of the local encode stack.
pub trait CapabilityProbe: Send + Sync {
    /// Whether frame-level encoding is available at all.
    fn supports_frame_encoding(&self) -> bool;

    /// Whether a concrete codec/resolution/bitrate/fps combination can be
    /// opened. A rejection here feeds fallback, it never reaches the caller.
    fn supports_encoder_config(&self, config: &EncoderConfig) -> bool;
}

/// The negotiated plan: pipeline choice plus, on the deterministic path,
/// the accepted encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    pub kind: PipelineKind,
    pub encoder: Option<EncoderConfig>,
}

/// Decide how an export runs. Never fails: every rejection degrades to the
/// real-time capture pipeline.
///
/// Deterministic encoding requires frame-level encode support, a WebM
/// target, and at least one of VP9/VP8 accepting the target configuration.
pub fn negotiate(
    probe: &dyn CapabilityProbe,
    request: &TranscodeRequest,
    width: u32,
    height: u32,
    keyframe_interval: u32,
) -> Negotiation {
    if request.format != OutputFormat::Webm {
        debug!(format = ?request.format, "Non-WebM target, using real-time capture");
        return realtime();
    }
    if !probe.supports_frame_encoding() {
        info!("Frame-level encoding unavailable, falling back to real-time capture");
        return realtime();
    }

    // VP9 preferred, VP8 as the compatibility fallback.
    for codec in [VideoCodec::Vp9, VideoCodec::Vp8] {
        let config = EncoderConfig {
            codec,
            width,
            height,
            bitrate: request.bitrate,
            fps: request.fps,
            keyframe_interval,
        };
        if probe.supports_encoder_config(&config) {
            info!(codec = codec.name(), "Negotiated deterministic encode");
            return Negotiation {
                kind: PipelineKind::DeterministicEncode,
                encoder: Some(config),
            };
        }
        debug!(codec = codec.name(), "Encoder configuration rejected");
    }

    info!("No codec accepted the target configuration, using real-time capture");
    realtime()
}

fn realtime() -> Negotiation {
    Negotiation {
        kind: PipelineKind::RealTimeCapture,
        encoder: None,
    }
}
