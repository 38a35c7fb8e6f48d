//! Real-time capture fallback: play the trim range against the wall clock
//! and record what gets painted. Used whenever frame-level encoding is not
//! available or the target is not WebM.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Tuning;
use crate::domain::model::{EncodedArtifact, RasterFrame, SourceMetadata, TranscodeRequest};
use crate::error::{ExportError, ExportResult};
use crate::pipeline::ExportPipeline;
use crate::progress::{CancelToken, ProgressSink};
use crate::sampler::{FrameSampler, PositionGuard, SourceFactory};

/// Run CPU-bound libav work (decode, scale, encode) without stalling the
/// async worker that drives the tick loop. `block_in_place` panics on a
/// current-thread runtime, so the work runs inline there.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::current().runtime_flavor() {
        tokio::runtime::RuntimeFlavor::MultiThread => tokio::task::block_in_place(work),
        _ => work(),
    }
}

/// Recorder seam for the capture path. Started before playback so the
/// first painted frames are never dropped.
pub trait StreamRecorder: Send {
    fn start(&mut self) -> ExportResult<()>;

    /// Record the currently painted frame; `elapsed` is wall-clock seconds
    /// since capture started.
    fn push_frame(&mut self, frame: &RasterFrame, elapsed: f64) -> ExportResult<()>;

    /// Stop recording and assemble the collected chunks into one artifact.
    fn stop(self: Box<Self>) -> ExportResult<EncodedArtifact>;
}

pub trait RecorderFactory: Send + Sync {
    fn create(
        &self,
        request: &TranscodeRequest,
        metadata: &SourceMetadata,
    ) -> ExportResult<Box<dyn StreamRecorder>>;
}

pub struct RealTimeCapturePipeline {
    sources: Arc<dyn SourceFactory>,
    recorders: Arc<dyn RecorderFactory>,
    tuning: Tuning,
}

impl RealTimeCapturePipeline {
    pub fn new(
        sources: Arc<dyn SourceFactory>,
        recorders: Arc<dyn RecorderFactory>,
        tuning: Tuning,
    ) -> Self {
        Self {
            sources,
            recorders,
            tuning,
        }
    }
}

#[async_trait]
impl ExportPipeline for RealTimeCapturePipeline {
    /// Progress on this path is elapsed wall-clock time over clip duration,
    /// clamped to 100. It is an approximation: under load the paint loop
    /// can lag the clock, and there is no frame-count ground truth here.
    async fn export(
        &self,
        request: TranscodeRequest,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> ExportResult<EncodedArtifact> {
        let mut source = self.sources.open()?;
        let metadata = source.metadata();
        let mut recorder = self.recorders.create(&request, &metadata)?;
        recorder.start()?;

        let restore = PositionGuard::capture(source.as_ref());
        let seek_wait = Duration::from_millis(self.tuning.seek_timeout_ms);
        run_blocking(|| source.seek(request.start, seek_wait))?;

        let duration = request.duration();
        let fps = f64::from(request.fps);
        let frame_period = Duration::from_secs_f64(1.0 / fps);
        let grace = Duration::from_millis(self.tuning.realtime_grace_ms);
        let hard_limit =
            Duration::from_secs_f64(duration) + Duration::from_secs(self.tuning.realtime_buffer_secs);
        info!(
            duration,
            fps = request.fps,
            hard_limit_secs = hard_limit.as_secs_f64(),
            "Starting real-time capture"
        );

        let sampler = FrameSampler;
        let capture = async {
            let started = tokio::time::Instant::now();
            let mut ticker = tokio::time::interval(frame_period);
            loop {
                ticker.tick().await;
                cancel.check()?;
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed >= duration {
                    progress.report(100.0);
                    // Let the recorder drain the final frames before stopping.
                    tokio::time::sleep(grace).await;
                    return Ok::<(), ExportError>(());
                }
                let position = request.start + elapsed;
                run_blocking(|| -> ExportResult<()> {
                    let frame = sampler
                        .sample(source.as_mut(), position, frame_period)
                        .map_err(|e| ExportError::capture(format!("paint failed: {e}")))?;
                    recorder.push_frame(&frame, elapsed)
                })?;
                progress.report(elapsed / duration * 100.0);
            }
        };

        let outcome = tokio::time::timeout(hard_limit, capture).await;
        match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    limit_secs = hard_limit.as_secs_f64(),
                    "Capture hit the hard stop timeout"
                );
                progress.report(100.0);
            }
        }

        run_blocking(|| restore.restore(source.as_mut(), frame_period))?;
        let artifact = recorder.stop()?;
        info!(bytes = artifact.len(), "Real-time capture finished");
        Ok(artifact)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecorderLog {
        pub started: bool,
        pub stopped: bool,
        pub pushes: Vec<f64>,
    }

    pub struct FakeRecorder {
        log: Arc<Mutex<RecorderLog>>,
        fail_push: bool,
    }

    pub struct FakeRecorderFactory {
        pub log: Arc<Mutex<RecorderLog>>,
        pub fail_push: bool,
    }

    impl FakeRecorderFactory {
        pub fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(RecorderLog::default())),
                fail_push: false,
            }
        }
    }

    impl RecorderFactory for FakeRecorderFactory {
        fn create(
            &self,
            _request: &TranscodeRequest,
            _metadata: &SourceMetadata,
        ) -> ExportResult<Box<dyn StreamRecorder>> {
            Ok(Box::new(FakeRecorder {
                log: Arc::clone(&self.log),
                fail_push: self.fail_push,
            }))
        }
    }

    impl StreamRecorder for FakeRecorder {
        fn start(&mut self) -> ExportResult<()> {
            self.log.lock().unwrap().started = true;
            Ok(())
        }

        fn push_frame(&mut self, _frame: &RasterFrame, elapsed: f64) -> ExportResult<()> {
            if self.fail_push {
                return Err(ExportError::capture("recorder fault injected"));
            }
            let mut log = self.log.lock().unwrap();
            assert!(log.started, "push before start");
            log.pushes.push(elapsed);
            Ok(())
        }

        fn stop(self: Box<Self>) -> ExportResult<EncodedArtifact> {
            let mut log = self.log.lock().unwrap();
            log.stopped = true;
            Ok(EncodedArtifact::new(
                vec![0u8; log.pushes.len() * 64],
                "video/webm",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{self, FakeRecorderFactory};
    use super::*;
    use crate::domain::model::OutputFormat;
    use crate::sampler::testing::FakeFactory;

    fn request(start: f64, end: f64, fps: u32) -> TranscodeRequest {
        TranscodeRequest {
            input: "clip.mp4".into(),
            start,
            end,
            format: OutputFormat::Mp4,
            quality: 0.8,
            bitrate: 2_500_000,
            fps,
        }
    }

    fn pipeline(
        recorders: FakeRecorderFactory,
        tuning: Tuning,
    ) -> (
        RealTimeCapturePipeline,
        Arc<std::sync::Mutex<testing::RecorderLog>>,
    ) {
        let log = Arc::clone(&recorders.log);
        let pipeline = RealTimeCapturePipeline::new(
            Arc::new(FakeFactory::new(10.0, 30)),
            Arc::new(recorders),
            tuning,
        );
        (pipeline, log)
    }

    #[tokio::test(start_paused = true)]
    async fn captures_one_frame_per_tick_then_grace_stops() {
        let (pipeline, log) = pipeline(FakeRecorderFactory::new(), Tuning::default());
        let started = tokio::time::Instant::now();
        // 25 fps gives an exact 40ms tick under the paused clock.
        let artifact = pipeline
            .export(request(0.0, 2.0, 25), ProgressSink::discard(), CancelToken::new())
            .await
            .unwrap();
        let log = log.lock().unwrap();
        assert!(log.started);
        assert!(log.stopped);
        assert_eq!(log.pushes.len(), 50);
        assert!(!artifact.is_empty());
        // duration + grace under the paused clock, nothing more.
        assert_eq!(started.elapsed(), Duration::from_millis(2200));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn capture_completes_on_a_multi_thread_runtime() {
        // Exercises the block_in_place branch around sample/push.
        let (pipeline, log) = pipeline(FakeRecorderFactory::new(), Tuning::default());
        let artifact = pipeline
            .export(request(0.0, 0.2, 25), ProgressSink::discard(), CancelToken::new())
            .await
            .unwrap();
        let log = log.lock().unwrap();
        assert!(log.stopped);
        assert!(!log.pushes.is_empty());
        assert!(!artifact.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_clamped_and_ends_at_100() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer = Arc::clone(&seen);
        let (pipeline, _) = pipeline(FakeRecorderFactory::new(), Tuning::default());
        pipeline
            .export(
                request(1.0, 3.0, 30),
                ProgressSink::new(move |p| writer.lock().unwrap().push(p)),
                CancelToken::new(),
            )
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn hard_timeout_stops_the_recorder() {
        // With no buffer the grace sleep crosses the hard limit, so the
        // timeout path must still stop and return a complete artifact.
        let tuning = Tuning {
            realtime_buffer_secs: 0,
            ..Tuning::default()
        };
        let (pipeline, log) = pipeline(FakeRecorderFactory::new(), tuning);
        let started = tokio::time::Instant::now();
        let artifact = pipeline
            .export(request(0.0, 2.0, 25), ProgressSink::discard(), CancelToken::new())
            .await
            .unwrap();
        assert!(log.lock().unwrap().stopped);
        assert!(!artifact.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn recorder_fault_is_a_capture_failure() {
        let mut recorders = FakeRecorderFactory::new();
        recorders.fail_push = true;
        let (pipeline, log) = pipeline(recorders, Tuning::default());
        let err = pipeline
            .export(request(0.0, 2.0, 30), ProgressSink::discard(), CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::CaptureFailure { .. }));
        assert!(!log.lock().unwrap().stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_capture() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let (pipeline, log) = pipeline(FakeRecorderFactory::new(), Tuning::default());
        let err = pipeline
            .export(request(0.0, 2.0, 30), ProgressSink::discard(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(log.lock().unwrap().pushes.is_empty());
    }
}
