//! Thumbnail strip generation over fake decode sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framecut::domain::model::{RasterFrame, SourceMetadata};
use framecut::error::{ExportError, ExportResult};
use framecut::sampler::{DecodeSource, SeekOutcome, SourceFactory};
use framecut::thumbs::{count_for_width, plan_timestamps, ThumbnailGenerator};
use framecut::{CancelToken, ProgressSink, Tuning};

/// Fake source with an optional per-sample decode delay, used to shuffle
/// completion order across a batch.
struct SlowSource {
    meta: SourceMetadata,
    position: f64,
    delay: Duration,
}

impl DecodeSource for SlowSource {
    fn seek(&mut self, timestamp: f64, _wait: Duration) -> ExportResult<SeekOutcome> {
        self.position = timestamp.clamp(0.0, self.meta.duration);
        Ok(SeekOutcome::Ready)
    }

    fn grab_frame(&mut self) -> ExportResult<RasterFrame> {
        if !self.delay.is_zero() {
            // Later timestamps decode faster, so completion order inverts
            // within each batch.
            let factor = 1.0 - self.position / self.meta.duration;
            std::thread::sleep(self.delay.mul_f64(factor.max(0.1)));
        }
        let len = (self.meta.width * self.meta.height * 3) as usize;
        RasterFrame::new(
            self.meta.width,
            self.meta.height,
            vec![(self.position * 10.0) as u8; len],
            self.position,
        )
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn metadata(&self) -> SourceMetadata {
        self.meta
    }
}

struct SlowFactory {
    meta: SourceMetadata,
    delay: Duration,
    opens: Arc<AtomicUsize>,
}

impl SlowFactory {
    fn new(meta: SourceMetadata, delay: Duration) -> Self {
        Self {
            meta,
            delay,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl SourceFactory for SlowFactory {
    fn open(&self) -> ExportResult<Box<dyn DecodeSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SlowSource {
            meta: self.meta,
            position: 0.0,
            delay: self.delay,
        }))
    }
}

fn metadata() -> SourceMetadata {
    SourceMetadata {
        duration: 30.0,
        width: 16,
        height: 8,
        fps: 30,
    }
}

#[test]
fn sizing_rule_matches_display_width() {
    let tuning = Tuning::default();
    assert_eq!(count_for_width(1200, &tuning), 15);
    assert_eq!(count_for_width(80, &tuning), 5);
    assert_eq!(count_for_width(10_000, &tuning), 30);
    let ts = plan_timestamps(30.0, 15);
    assert_eq!(ts[0], 0.0);
    assert!(ts.iter().all(|&t| t < 30.0));
}

#[tokio::test]
async fn strip_stays_ordered_when_completion_order_shuffles() {
    let sources = SlowFactory::new(metadata(), Duration::from_millis(20));
    let generator =
        ThumbnailGenerator::new(Arc::new(sources), metadata(), Tuning::default());
    let strip = generator
        .generate(1200, ProgressSink::discard(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(strip.len(), 15);
    assert!(strip.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(strip.iter().enumerate().all(|(i, t)| t.index == i));
}

#[tokio::test]
async fn every_batch_member_gets_its_own_source() {
    let sources = SlowFactory::new(metadata(), Duration::ZERO);
    let opens = Arc::clone(&sources.opens);
    let generator =
        ThumbnailGenerator::new(Arc::new(sources), metadata(), Tuning::default());
    let strip = generator
        .generate(1200, ProgressSink::discard(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), strip.len());
}

#[tokio::test]
async fn thumbnails_are_scaled_to_strip_height() {
    let sources = SlowFactory::new(metadata(), Duration::ZERO);
    let generator =
        ThumbnailGenerator::new(Arc::new(sources), metadata(), Tuning::default());
    let strip = generator
        .generate(400, ProgressSink::discard(), CancelToken::new())
        .await
        .unwrap();
    for thumb in &strip {
        // source is 16x8, strip height caps at the source height
        assert_eq!(thumb.height, 8);
        assert_eq!(thumb.width, 16);
        assert_eq!(thumb.rgb.len(), (thumb.width * thumb.height * 3) as usize);
    }
}

#[tokio::test]
async fn progress_advances_per_batch_to_100() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&seen);
    let sources = SlowFactory::new(metadata(), Duration::ZERO);
    let generator =
        ThumbnailGenerator::new(Arc::new(sources), metadata(), Tuning::default());
    generator
        .generate(
            1200,
            ProgressSink::new(move |p| writer.lock().unwrap().push(p)),
            CancelToken::new(),
        )
        .await
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*seen.last().unwrap(), 100.0);
}

#[tokio::test]
async fn invalidated_run_is_superseded_and_publishes_nothing() {
    let sources = SlowFactory::new(metadata(), Duration::from_millis(200));
    let generator = Arc::new(ThumbnailGenerator::new(
        Arc::new(sources),
        metadata(),
        Tuning::default(),
    ));
    let handle = generator.handle();

    let running = Arc::clone(&generator);
    let task = tokio::spawn(async move {
        running
            .generate(1200, ProgressSink::discard(), CancelToken::new())
            .await
    });
    // let the first batch get under way, then supersede it
    tokio::time::sleep(Duration::from_millis(50)).await;
    generator.invalidate();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert!(handle.snapshot().is_empty());
}

#[tokio::test]
async fn cancellation_schedules_no_batches()  {
    let sources = SlowFactory::new(metadata(), Duration::ZERO);
    let opens = Arc::clone(&sources.opens);
    let generator =
        ThumbnailGenerator::new(Arc::new(sources), metadata(), Tuning::default());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = generator
        .generate(1200, ProgressSink::discard(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert_eq!(opens.load(Ordering::SeqCst), 0);
}
