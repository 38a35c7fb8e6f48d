//! Frame-accurate export: decode, re-encode and mux every frame in the
//! trim range. Deterministic output for a given source and request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Tuning;
use crate::domain::model::{EncodedArtifact, EncoderConfig, RasterFrame, TranscodeRequest};
use crate::error::{ExportError, ExportResult};
use crate::pipeline::session::EncodeSession;
use crate::pipeline::ExportPipeline;
use crate::progress::{CancelToken, ProgressSink};
use crate::sampler::{FrameSampler, PositionGuard, SourceFactory};

/// Frame-level encoder seam. Implementations own the codec and the
/// container; encoded chunks are appended in submission order as the
/// encoder emits them.
pub trait FrameEncoder: Send {
    /// Hand a frame to the encoder with its synthetic presentation index
    /// (timebase 1/fps). Returns the container bytes flushed by this
    /// submission. The caller drops the frame immediately afterwards.
    fn submit(&mut self, frame: &RasterFrame, pts: i64, keyframe: bool) -> ExportResult<u64>;

    /// Drain the encoder, finalize the container and return the artifact.
    fn finish(self: Box<Self>) -> ExportResult<EncodedArtifact>;
}

/// Opens a configured encoder. Configuration errors surface here, before
/// any frame is decoded.
pub trait EncoderFactory: Send + Sync {
    fn configure(&self, config: &EncoderConfig) -> ExportResult<Box<dyn FrameEncoder>>;
}

pub struct DeterministicEncodePipeline {
    sources: Arc<dyn SourceFactory>,
    encoders: Arc<dyn EncoderFactory>,
    encoder_config: EncoderConfig,
    tuning: Tuning,
}

impl DeterministicEncodePipeline {
    pub fn new(
        sources: Arc<dyn SourceFactory>,
        encoders: Arc<dyn EncoderFactory>,
        encoder_config: EncoderConfig,
        tuning: Tuning,
    ) -> Self {
        Self {
            sources,
            encoders,
            encoder_config,
            tuning,
        }
    }

    fn run(
        sources: &dyn SourceFactory,
        encoders: &dyn EncoderFactory,
        encoder_config: &EncoderConfig,
        tuning: &Tuning,
        request: &TranscodeRequest,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> ExportResult<EncodedArtifact> {
        let mut session = EncodeSession::new();
        let result = Self::run_session(
            sources,
            encoders,
            encoder_config,
            tuning,
            request,
            progress,
            cancel,
            &mut session,
        );
        if result.is_err() {
            // Encoder and source are dropped with the session, so partial
            // output never escapes.
            session.fail();
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_session(
        sources: &dyn SourceFactory,
        encoders: &dyn EncoderFactory,
        encoder_config: &EncoderConfig,
        tuning: &Tuning,
        request: &TranscodeRequest,
        progress: &ProgressSink,
        cancel: &CancelToken,
        session: &mut EncodeSession,
    ) -> ExportResult<EncodedArtifact> {
        session.begin_configuring()?;
        let mut encoder = encoders.configure(encoder_config)?;
        // This pipeline is strictly sequential over one private source.
        let mut source = sources.open()?;
        let restore = PositionGuard::capture(source.as_ref());
        session.begin_encoding()?;

        let fps = f64::from(request.fps);
        let total_frames = (request.duration() * fps).ceil() as u64;
        let seek_wait = Duration::from_millis(tuning.seek_timeout_ms);
        let sampler = FrameSampler;
        info!(
            total_frames,
            fps = request.fps,
            codec = encoder_config.codec.name(),
            "Starting deterministic encode"
        );

        for i in 0..total_frames {
            cancel.check()?;
            let timestamp = request.start + i as f64 / fps;
            if timestamp > request.end {
                debug!(frame = i, timestamp, "Timestamp past end of range");
                break;
            }
            let frame = sampler.sample(source.as_mut(), timestamp, seek_wait)?;
            let keyframe = i % u64::from(encoder_config.keyframe_interval) == 0;
            let flushed = encoder.submit(&frame, i as i64, keyframe)?;
            drop(frame);
            session.record_frame()?;
            session.record_bytes(flushed)?;
            progress.report((i + 1) as f64 / total_frames as f64 * 100.0);
        }

        // Sampling done; put the source back where it started.
        restore.restore(source.as_mut(), seek_wait)?;

        session.begin_flushing()?;
        let artifact = encoder.finish()?;
        session.finalize()?;
        progress.report(100.0);
        info!(
            frames = session.frames_submitted(),
            bytes = artifact.len(),
            "Deterministic encode finished"
        );
        Ok(artifact)
    }
}

#[async_trait]
impl ExportPipeline for DeterministicEncodePipeline {
    async fn export(
        &self,
        request: TranscodeRequest,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> ExportResult<EncodedArtifact> {
        let sources = Arc::clone(&self.sources);
        let encoders = Arc::clone(&self.encoders);
        let encoder_config = self.encoder_config.clone();
        let tuning = self.tuning.clone();
        tokio::task::spawn_blocking(move || {
            Self::run(
                sources.as_ref(),
                encoders.as_ref(),
                &encoder_config,
                &tuning,
                &request,
                &progress,
                &cancel,
            )
        })
        .await
        .map_err(|e| ExportError::Runtime {
            message: format!("Encode task aborted: {e}"),
        })?
    }
}
