//! Tuning knobs loaded from an optional TOML file. Every field has a
//! default matching the shipped behavior, so a missing or partial file
//! never changes semantics unexpectedly.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ExportError, ExportResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Force a keyframe every N submitted frames on the deterministic path.
    pub keyframe_interval: u32,
    /// Thumbnails decoded in parallel per batch.
    pub thumb_batch_size: usize,
    /// How long a single-frame sample waits for a seek to settle.
    pub seek_timeout_ms: u64,
    /// Shorter seek wait used by batched thumbnail sampling.
    pub thumb_seek_timeout_ms: u64,
    /// Delay between playback crossing the end mark and stopping the recorder.
    pub realtime_grace_ms: u64,
    /// Added to the clip duration for the real-time hard stop timeout.
    pub realtime_buffer_secs: u64,
    pub thumb_min_count: usize,
    pub thumb_max_count: usize,
    /// Thumbnail strip height in pixels; width follows the source aspect.
    pub thumb_height: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            keyframe_interval: 150,
            thumb_batch_size: 3,
            seek_timeout_ms: 1000,
            thumb_seek_timeout_ms: 100,
            realtime_grace_ms: 200,
            realtime_buffer_secs: 2,
            thumb_min_count: 5,
            thumb_max_count: 30,
            thumb_height: 64,
        }
    }
}

impl Tuning {
    /// Load from a TOML file, falling back to defaults for absent fields.
    pub fn load(path: &Path) -> ExportResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ExportError::Config {
            message: format!("Cannot read {}: {e}", path.display()),
        })?;
        let tuning: Tuning = toml::from_str(&raw).map_err(|e| ExportError::Config {
            message: format!("Cannot parse {}: {e}", path.display()),
        })?;
        tuning.validate()?;
        info!(path = %path.display(), "Loaded tuning configuration");
        Ok(tuning)
    }

    /// Load from `path` when given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> ExportResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> ExportResult<()> {
        if self.keyframe_interval == 0 {
            return Err(ExportError::Config {
                message: "keyframe_interval must be at least 1".into(),
            });
        }
        if self.thumb_batch_size == 0 {
            return Err(ExportError::Config {
                message: "thumb_batch_size must be at least 1".into(),
            });
        }
        if self.thumb_min_count == 0 || self.thumb_min_count > self.thumb_max_count {
            return Err(ExportError::Config {
                message: format!(
                    "thumbnail count bounds [{}, {}] are invalid",
                    self.thumb_min_count, self.thumb_max_count
                ),
            });
        }
        if self.thumb_height == 0 {
            return Err(ExportError::Config {
                message: "thumb_height must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_shipped_behavior() {
        let tuning = Tuning::default();
        assert_eq!(tuning.keyframe_interval, 150);
        assert_eq!(tuning.thumb_batch_size, 3);
        assert_eq!(tuning.seek_timeout_ms, 1000);
        assert_eq!(tuning.thumb_seek_timeout_ms, 100);
        assert_eq!(tuning.realtime_grace_ms, 200);
        assert_eq!(tuning.thumb_height, 64);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "thumb_batch_size = 5").unwrap();
        let tuning = Tuning::load(file.path()).unwrap();
        assert_eq!(tuning.thumb_batch_size, 5);
        assert_eq!(tuning.keyframe_interval, 150);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "thumb_batch_size = 0").unwrap();
        assert!(matches!(
            Tuning::load(file.path()),
            Err(ExportError::Config { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error_but_none_is_defaults() {
        assert!(Tuning::load(Path::new("/nonexistent/framecut.toml")).is_err());
        assert!(Tuning::load_or_default(None).is_ok());
    }
}
