//! Progress reporting and cooperative cancellation.
//!
//! A `ProgressSink` belongs to one export session. It guarantees callers a
//! monotonically non-decreasing percentage stream: late or repeated reports
//! from concurrent batch work are clamped rather than re-emitted backwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

use crate::error::{ExportError, ExportResult};

/// Percentage callback wrapper, one per export session.
pub struct ProgressSink {
    callback: Box<dyn Fn(f64) + Send + Sync>,
    // f64 bit pattern; non-negative floats compare correctly as u64
    last: AtomicU64,
    // Serializes delivery so concurrent reporters cannot hand the observer
    // a lower value after a higher one.
    delivery: Mutex<()>,
}

impl ProgressSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
            last: AtomicU64::new(0f64.to_bits()),
            delivery: Mutex::new(()),
        }
    }

    /// A sink that drops every report.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Report completion percentage. Values below the last report are raised
    /// to it, values above 100 are clamped down, so observers only ever see a
    /// non-decreasing sequence ending at most at 100.
    pub fn report(&self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let value = clamped.max(self.last());
        self.last.store(value.to_bits(), Ordering::Release);
        (self.callback)(value);
    }

    pub fn last(&self) -> f64 {
        f64::from_bits(self.last.load(Ordering::Acquire))
    }
}

/// Cooperative cancellation flag shared between the caller and a running
/// export. Checked at frame and batch boundaries; never preemptive.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Bail out of the current operation if cancellation was requested.
    pub fn check(&self) -> ExportResult<()> {
        if self.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Structured progress events for scripting consumers, one JSON object per
/// line on stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JsonEvent<'a> {
    Start { input: &'a str, timestamp: String },
    Progress { percent: f64, timestamp: String },
    Complete { bytes: usize, timestamp: String },
    Error { message: &'a str, timestamp: String },
}

pub struct JsonProgress;

impl JsonProgress {
    fn emit(event: &JsonEvent<'_>) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }

    pub fn start(input: &str) {
        Self::emit(&JsonEvent::Start {
            input,
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    pub fn sink() -> ProgressSink {
        ProgressSink::new(|percent| {
            Self::emit(&JsonEvent::Progress {
                percent,
                timestamp: Utc::now().to_rfc3339(),
            });
        })
    }

    pub fn complete(bytes: usize) {
        Self::emit(&JsonEvent::Complete {
            bytes,
            timestamp: Utc::now().to_rfc3339(),
        });
    }

    pub fn error(message: &str) {
        Self::emit(&JsonEvent::Error {
            message,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}
