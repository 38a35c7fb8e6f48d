//! Request validation. Every rule here runs before any decode or encode
//! resource is opened; a violation surfaces as `InvalidRequest`.

use crate::domain::model::{
    SourceMetadata, TranscodeRequest, BITRATE_STEP, MAX_BITRATE, MAX_QUALITY, MIN_BITRATE,
    MIN_QUALITY, SUPPORTED_FPS,
};
use crate::error::{ExportError, ExportResult};

/// Validate a request against the probed source metadata.
pub fn validate_request(request: &TranscodeRequest, source: &SourceMetadata) -> ExportResult<()> {
    validate_range(request.start, request.end, source.duration)?;
    validate_quality(request.quality)?;
    validate_bitrate(request.bitrate)?;
    validate_fps(request.fps)?;
    Ok(())
}

fn validate_range(start: f64, end: f64, duration: f64) -> ExportResult<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(ExportError::invalid("Trim times must be finite numbers"));
    }
    if start < 0.0 {
        return Err(ExportError::invalid(format!(
            "Start time {start:.3}s is before the beginning of the source"
        )));
    }
    if end <= start {
        return Err(ExportError::invalid(format!(
            "End time {end:.3}s must be after start time {start:.3}s"
        )));
    }
    if end > duration {
        return Err(ExportError::invalid(format!(
            "End time {end:.3}s exceeds source duration {duration:.3}s"
        )));
    }
    Ok(())
}

fn validate_quality(quality: f64) -> ExportResult<()> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(ExportError::invalid(format!(
            "Quality {quality} out of range [{MIN_QUALITY}, {MAX_QUALITY}]"
        )));
    }
    Ok(())
}

fn validate_bitrate(bitrate: u64) -> ExportResult<()> {
    if !(MIN_BITRATE..=MAX_BITRATE).contains(&bitrate) {
        return Err(ExportError::invalid(format!(
            "Bitrate {bitrate} out of range [{MIN_BITRATE}, {MAX_BITRATE}]"
        )));
    }
    if bitrate % BITRATE_STEP != 0 {
        return Err(ExportError::invalid(format!(
            "Bitrate {bitrate} must be a multiple of {BITRATE_STEP}"
        )));
    }
    Ok(())
}

fn validate_fps(fps: u32) -> ExportResult<()> {
    if !SUPPORTED_FPS.contains(&fps) {
        return Err(ExportError::invalid(format!(
            "Frame rate {fps} not in supported set {SUPPORTED_FPS:?}"
        )));
    }
    Ok(())
}
