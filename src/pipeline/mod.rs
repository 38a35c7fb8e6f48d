//! Export orchestration: one trait, two strategies, one facade.

pub mod deterministic;
pub mod realtime;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Tuning;
use crate::domain::model::{EncodedArtifact, SourceMetadata, TranscodeRequest};
use crate::domain::rules::validate_request;
use crate::error::ExportResult;
use crate::negotiator::{negotiate, CapabilityProbe, PipelineKind};
use crate::progress::{CancelToken, ProgressSink};
use crate::sampler::SourceFactory;

pub use deterministic::{DeterministicEncodePipeline, EncoderFactory, FrameEncoder};
pub use realtime::{RealTimeCapturePipeline, RecorderFactory, StreamRecorder};
pub use session::{EncodeSession, SessionPhase};

/// One export strategy. Implementations return a complete artifact or an
/// error; never partial output.
#[async_trait]
pub trait ExportPipeline: Send + Sync {
    async fn export(
        &self,
        request: TranscodeRequest,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> ExportResult<EncodedArtifact>;
}

/// Front door for exports: validates, negotiates, dispatches.
///
/// Holds the source metadata from construction time so every request is
/// checked before any decode or encode resource is opened.
pub struct Exporter {
    metadata: SourceMetadata,
    probe: Arc<dyn CapabilityProbe>,
    sources: Arc<dyn SourceFactory>,
    encoders: Arc<dyn EncoderFactory>,
    recorders: Arc<dyn RecorderFactory>,
    tuning: Tuning,
}

impl Exporter {
    pub fn new(
        metadata: SourceMetadata,
        probe: Arc<dyn CapabilityProbe>,
        sources: Arc<dyn SourceFactory>,
        encoders: Arc<dyn EncoderFactory>,
        recorders: Arc<dyn RecorderFactory>,
        tuning: Tuning,
    ) -> Self {
        Self {
            metadata,
            probe,
            sources,
            encoders,
            recorders,
            tuning,
        }
    }

    pub fn metadata(&self) -> SourceMetadata {
        self.metadata
    }

    /// Run one export end to end. One in-flight export per call; callers
    /// wanting concurrency run separate `Exporter`s over separate sources.
    pub async fn export(
        &self,
        request: TranscodeRequest,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> ExportResult<EncodedArtifact> {
        validate_request(&request, &self.metadata)?;

        let plan = negotiate(
            self.probe.as_ref(),
            &request,
            self.metadata.width,
            self.metadata.height,
            self.tuning.keyframe_interval,
        );
        info!(
            kind = ?plan.kind,
            start = request.start,
            end = request.end,
            format = ?request.format,
            "Export plan negotiated"
        );

        let pipeline: Box<dyn ExportPipeline> = match (plan.kind, plan.encoder) {
            (PipelineKind::DeterministicEncode, Some(config)) => {
                Box::new(DeterministicEncodePipeline::new(
                    Arc::clone(&self.sources),
                    Arc::clone(&self.encoders),
                    config,
                    self.tuning.clone(),
                ))
            }
            _ => Box::new(RealTimeCapturePipeline::new(
                Arc::clone(&self.sources),
                Arc::clone(&self.recorders),
                self.tuning.clone(),
            )),
        };

        pipeline.export(request, progress, cancel).await
    }
}
