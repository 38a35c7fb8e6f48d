//! Batched thumbnail strip generation.
//!
//! Thumbnails are sampled in fixed-size parallel batches; every batch
//! member opens its own decode source, so no source handle is ever shared
//! across concurrent samplers. Results land in index-addressed slots, so
//! the strip is timestamp-ordered no matter which sample finishes first.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::Tuning;
use crate::domain::model::{RasterFrame, SourceMetadata};
use crate::error::{ExportError, ExportResult};
use crate::progress::{CancelToken, ProgressSink};
use crate::sampler::{FrameSampler, SourceFactory};

/// One scaled-down strip entry.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub index: usize,
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// How many thumbnails a strip of `width_px` display pixels gets.
pub fn count_for_width(width_px: u32, tuning: &Tuning) -> usize {
    (width_px as usize / 80).clamp(tuning.thumb_min_count, tuning.thumb_max_count)
}

/// Evenly spaced sample points over `[0, duration)`.
pub fn plan_timestamps(duration: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| duration / count as f64 * i as f64).collect()
}

/// Nearest-neighbor downscale to the strip height, aspect preserved.
pub fn downscale(frame: &RasterFrame, index: usize, target_height: u32) -> Thumbnail {
    let src_w = frame.width();
    let src_h = frame.height();
    let height = target_height.min(src_h);
    let width = ((src_w as u64 * height as u64 / src_h as u64) as u32).max(1);
    let src = frame.rgb();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        let sy = (y as u64 * src_h as u64 / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * src_w as u64 / width as u64) as u32;
            let offset = ((sy * src_w + sx) * 3) as usize;
            rgb.extend_from_slice(&src[offset..offset + 3]);
        }
    }
    Thumbnail {
        index,
        timestamp: frame.timestamp(),
        width,
        height,
        rgb,
    }
}

#[derive(Debug, Default)]
struct StripState {
    generation: u64,
    slots: Vec<Option<Thumbnail>>,
}

impl StripState {
    /// Store a result if it still belongs to the active run.
    fn commit(&mut self, generation: u64, thumb: Thumbnail) -> bool {
        if generation != self.generation {
            return false;
        }
        let index = thumb.index;
        self.slots[index] = Some(thumb);
        true
    }
}

/// Shared view of the strip being built.
#[derive(Clone, Default)]
pub struct StripHandle {
    state: Arc<Mutex<StripState>>,
}

impl StripHandle {
    /// Thumbnails available so far, in timestamp order.
    pub fn snapshot(&self) -> Vec<Thumbnail> {
        self.state
            .lock()
            .unwrap()
            .slots
            .iter()
            .flatten()
            .cloned()
            .collect()
    }
}

pub struct ThumbnailGenerator {
    sources: Arc<dyn SourceFactory>,
    metadata: SourceMetadata,
    tuning: Tuning,
    handle: StripHandle,
}

impl ThumbnailGenerator {
    pub fn new(sources: Arc<dyn SourceFactory>, metadata: SourceMetadata, tuning: Tuning) -> Self {
        Self {
            sources,
            metadata,
            tuning,
            handle: StripHandle::default(),
        }
    }

    pub fn handle(&self) -> StripHandle {
        self.handle.clone()
    }

    /// Invalidate the run in flight, e.g. when the strip is resized or the
    /// source changes. The superseded run stops at its next batch boundary
    /// and its remaining results are discarded.
    pub fn invalidate(&self) {
        let mut state = self.handle.state.lock().unwrap();
        state.generation += 1;
        debug!(generation = state.generation, "Thumbnail run invalidated");
    }

    /// Build a strip sized for `display_width` pixels. Supersedes any run
    /// already in flight.
    pub async fn generate(
        &self,
        display_width: u32,
        progress: ProgressSink,
        cancel: CancelToken,
    ) -> ExportResult<Vec<Thumbnail>> {
        let count = count_for_width(display_width, &self.tuning);
        let timestamps = plan_timestamps(self.metadata.duration, count);
        let generation = {
            let mut state = self.handle.state.lock().unwrap();
            state.generation += 1;
            state.slots = vec![None; count];
            state.generation
        };
        info!(count, generation, "Generating thumbnail strip");

        let wait = Duration::from_millis(self.tuning.thumb_seek_timeout_ms);
        let height = self.tuning.thumb_height;
        let mut completed = 0usize;

        let indexed: Vec<(usize, f64)> = timestamps.into_iter().enumerate().collect();
        for batch in indexed.chunks(self.tuning.thumb_batch_size) {
            cancel.check()?;
            if self.handle.state.lock().unwrap().generation != generation {
                debug!(generation, "Run superseded, stopping batch scheduling");
                return Err(ExportError::Cancelled);
            }

            let mut tasks: JoinSet<ExportResult<Thumbnail>> = JoinSet::new();
            for &(index, timestamp) in batch {
                // One private source per batch member.
                let sources = Arc::clone(&self.sources);
                tasks.spawn_blocking(move || {
                    let mut source = sources.open()?;
                    let frame = FrameSampler.sample(source.as_mut(), timestamp, wait)?;
                    Ok(downscale(&frame, index, height))
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let thumb = joined.map_err(|e| ExportError::Runtime {
                    message: format!("Thumbnail task aborted: {e}"),
                })??;
                let mut state = self.handle.state.lock().unwrap();
                if state.commit(generation, thumb) {
                    completed += 1;
                }
            }
            progress.report(completed as f64 / count as f64 * 100.0);
        }

        let state = self.handle.state.lock().unwrap();
        if state.generation != generation {
            return Err(ExportError::Cancelled);
        }
        let strip: Vec<Thumbnail> = state.slots.iter().flatten().cloned().collect();
        Ok(strip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::testing::FakeFactory;
    use std::sync::atomic::Ordering;

    fn metadata(duration: f64) -> SourceMetadata {
        SourceMetadata {
            duration,
            width: 8,
            height: 4,
            fps: 30,
        }
    }

    #[test]
    fn count_follows_width_within_bounds() {
        let tuning = Tuning::default();
        assert_eq!(count_for_width(1200, &tuning), 15);
        assert_eq!(count_for_width(200, &tuning), 5);
        assert_eq!(count_for_width(4000, &tuning), 30);
    }

    #[test]
    fn timestamps_are_evenly_spaced_and_exclude_duration() {
        let ts = plan_timestamps(30.0, 15);
        assert_eq!(ts.len(), 15);
        assert_eq!(ts[0], 0.0);
        assert_eq!(ts[1], 2.0);
        assert!(*ts.last().unwrap() < 30.0);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn downscale_preserves_aspect() {
        let frame = RasterFrame::new(8, 4, vec![7; 8 * 4 * 3], 1.5).unwrap();
        let thumb = downscale(&frame, 3, 2);
        assert_eq!(thumb.height, 2);
        assert_eq!(thumb.width, 4);
        assert_eq!(thumb.index, 3);
        assert_eq!(thumb.timestamp, 1.5);
        assert_eq!(thumb.rgb.len(), 4 * 2 * 3);
        assert!(thumb.rgb.iter().all(|&b| b == 7));
    }

    #[test]
    fn stale_generation_never_overwrites() {
        let mut state = StripState {
            generation: 2,
            slots: vec![None; 3],
        };
        let thumb = Thumbnail {
            index: 1,
            timestamp: 0.0,
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
        };
        assert!(!state.commit(1, thumb.clone()));
        assert!(state.slots[1].is_none());
        assert!(state.commit(2, thumb));
        assert!(state.slots[1].is_some());
    }

    #[tokio::test]
    async fn strip_is_ordered_and_isolated() {
        let sources = Arc::new(FakeFactory::new(30.0, 30));
        let opens = Arc::clone(&sources.opens);
        let generator = ThumbnailGenerator::new(sources, metadata(30.0), Tuning::default());
        let strip = generator
            .generate(1200, ProgressSink::discard(), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(strip.len(), 15);
        // index slots keep the strip timestamp-ordered
        assert!(strip.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(strip.iter().enumerate().all(|(i, t)| t.index == i));
        // one decode source opened per thumbnail, none shared
        assert_eq!(opens.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn progress_reaches_100_per_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&seen);
        let sources = Arc::new(FakeFactory::new(30.0, 30));
        let generator = ThumbnailGenerator::new(sources, metadata(30.0), Tuning::default());
        generator
            .generate(
                1200,
                ProgressSink::new(move |p| writer.lock().unwrap().push(p)),
                CancelToken::new(),
            )
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        // 15 thumbnails in batches of 3
        assert_eq!(seen.len(), 5);
        assert_eq!(*seen.last().unwrap(), 100.0);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn cancellation_stops_scheduling() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let sources = Arc::new(FakeFactory::new(30.0, 30));
        let opens = Arc::clone(&sources.opens);
        let generator = ThumbnailGenerator::new(sources, metadata(30.0), Tuning::default());
        let err = generator
            .generate(1200, ProgressSink::discard(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidated_run_reports_superseded() {
        let sources = Arc::new(FakeFactory::new(30.0, 30));
        let generator = ThumbnailGenerator::new(sources, metadata(30.0), Tuning::default());
        // Bump the generation the way a resize would, then observe that a
        // run holding the old generation refuses to publish.
        let stale = {
            let mut state = generator.handle.state.lock().unwrap();
            state.generation += 1;
            state.slots = vec![None; 1];
            state.generation
        };
        generator.invalidate();
        let thumb = Thumbnail {
            index: 0,
            timestamp: 0.0,
            width: 1,
            height: 1,
            rgb: vec![0, 0, 0],
        };
        let mut state = generator.handle.state.lock().unwrap();
        assert!(!state.commit(stale, thumb));
        assert!(state.slots[0].is_none());
    }
}
