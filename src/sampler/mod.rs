//! Frame sampling over an abstract decode source.
//!
//! A `DecodeSource` wraps one scarce decode surface. Concurrency rule: a
//! source is owned by exactly one sampler at a time; parallel work opens
//! additional sources through the `SourceFactory` instead of sharing one.

use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::model::{RasterFrame, SourceMetadata};
use crate::error::ExportResult;

/// Result of a bounded-wait seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The source settled on the requested timestamp.
    Ready,
    /// The wait elapsed first; the source is positioned on the closest
    /// frame it managed to decode.
    TimedOut,
}

/// One decoding handle over a media source.
pub trait DecodeSource: Send {
    /// Move to `timestamp` seconds, waiting at most `wait` for the decoder
    /// to settle on it.
    fn seek(&mut self, timestamp: f64, wait: Duration) -> ExportResult<SeekOutcome>;

    /// Decode and hand over the frame at the current position.
    fn grab_frame(&mut self) -> ExportResult<RasterFrame>;

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    fn metadata(&self) -> SourceMetadata;
}

/// Opens independent `DecodeSource` instances over the same underlying media.
pub trait SourceFactory: Send + Sync {
    fn open(&self) -> ExportResult<Box<dyn DecodeSource>>;
}

/// Samples single frames at requested timestamps.
#[derive(Debug, Default)]
pub struct FrameSampler;

impl FrameSampler {
    /// Grab the frame at `timestamp`. A seek that times out is not fatal:
    /// the best available frame is returned instead.
    pub fn sample(
        &self,
        source: &mut dyn DecodeSource,
        timestamp: f64,
        wait: Duration,
    ) -> ExportResult<RasterFrame> {
        match source.seek(timestamp, wait)? {
            SeekOutcome::Ready => {
                debug!(timestamp, "Seek settled");
            }
            SeekOutcome::TimedOut => {
                warn!(
                    timestamp,
                    wait_ms = wait.as_millis() as u64,
                    position = source.position(),
                    "Seek timed out, sampling best available frame"
                );
            }
        }
        source.grab_frame()
    }
}

/// Remembers a source's position so a sampling session can put it back.
#[derive(Debug)]
pub struct PositionGuard {
    saved: f64,
}

impl PositionGuard {
    pub fn capture(source: &dyn DecodeSource) -> Self {
        Self {
            saved: source.position(),
        }
    }

    pub fn saved(&self) -> f64 {
        self.saved
    }

    /// Seek back to the remembered position. Timing out here is harmless,
    /// so no wait distinction is surfaced.
    pub fn restore(self, source: &mut dyn DecodeSource, wait: Duration) -> ExportResult<()> {
        source.seek(self.saved, wait)?;
        Ok(())
    }
}
