// Domain models - core value types shared by every pipeline

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, ExportResult};

/// Frame rates the export surface accepts, matching what common sources use.
pub const SUPPORTED_FPS: [u32; 5] = [24, 25, 30, 50, 60];

/// Bitrate bounds in bits per second.
pub const MIN_BITRATE: u64 = 500_000;
pub const MAX_BITRATE: u64 = 8_000_000;
pub const BITRATE_STEP: u64 = 500_000;

/// Quality factor bounds.
pub const MIN_QUALITY: f64 = 0.1;
pub const MAX_QUALITY: f64 = 1.0;

/// Output container targets. Exactly two: the frame-level encoder packages
/// VP8/VP9 into WebM, everything else goes through the recorder path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webm,
    Mp4,
}

impl OutputFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webm => "webm",
            OutputFormat::Mp4 => "mp4",
        }
    }

    pub fn parse(value: &str) -> ExportResult<Self> {
        match value.to_lowercase().as_str() {
            "webm" => Ok(OutputFormat::Webm),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(ExportError::invalid(format!(
                "Unknown output format: {other}. Supported formats: webm, mp4"
            ))),
        }
    }
}

/// Video codecs the pipelines can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::H264 => "h264",
        }
    }
}

/// Concrete encoder configuration handed to the frame-level engine and to the
/// capability probe. Width/height come from the source's native resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub fps: u32,
    pub keyframe_interval: u32,
}

/// One export request. Immutable once constructed; validated against the
/// source metadata before any decode resource is opened.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: String,
    pub start: f64,
    pub end: f64,
    pub format: OutputFormat,
    pub quality: f64,
    pub bitrate: u64,
    pub fps: u32,
}

impl TranscodeRequest {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Metadata the player boundary supplies once per source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl SourceMetadata {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Snap a measured frame rate to the nearest commonly used value.
pub fn snap_fps(measured: f64) -> u32 {
    let mut best = SUPPORTED_FPS[0];
    for candidate in SUPPORTED_FPS {
        if (candidate as f64 - measured).abs() < (best as f64 - measured).abs() {
            best = candidate;
        }
    }
    best
}

/// A point in time within the source, in seconds.
///
/// Accepts plain seconds (`12.5`), `MM:SS[.ms]` (`1:30.25`) and
/// `HH:MM:SS[.ms]` (`1:02:03`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec {
    seconds: f64,
}

impl TimeSpec {
    pub fn from_seconds(seconds: f64) -> ExportResult<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ExportError::invalid(format!(
                "Time must be a non-negative number of seconds, got {seconds}"
            )));
        }
        Ok(Self { seconds })
    }

    pub fn parse(value: &str) -> ExportResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ExportError::invalid("Time string is empty"));
        }
        let parts: Vec<&str> = trimmed.split(':').collect();
        // The leading component is open-ended; minute and second positions
        // after it must stay below 60.
        let seconds = match parts.as_slice() {
            [secs] => Self::parse_component(secs, f64::INFINITY)?,
            [mins, secs] => {
                Self::parse_component(mins, f64::INFINITY)? * 60.0
                    + Self::parse_component(secs, 60.0)?
            }
            [hours, mins, secs] => {
                Self::parse_component(hours, f64::INFINITY)? * 3600.0
                    + Self::parse_component(mins, 60.0)? * 60.0
                    + Self::parse_component(secs, 60.0)?
            }
            _ => {
                return Err(ExportError::invalid(format!(
                    "Cannot parse time '{trimmed}': expected SS, MM:SS or HH:MM:SS"
                )))
            }
        };
        Self::from_seconds(seconds)
    }

    fn parse_component(part: &str, bound: f64) -> ExportResult<f64> {
        let value = part.parse::<f64>().map_err(|_| {
            ExportError::invalid(format!("Invalid time component '{part}'"))
        })?;
        if value < 0.0 || value >= bound {
            return Err(ExportError::invalid(format!(
                "Time component '{part}' is out of range"
            )));
        }
        Ok(value)
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }
}

impl std::fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total = self.seconds;
        let hours = (total / 3600.0) as u64;
        let mins = ((total % 3600.0) / 60.0) as u64;
        let secs = total % 60.0;
        if hours > 0 {
            write!(f, "{hours}:{mins:02}:{secs:06.3}")
        } else {
            write!(f, "{mins}:{secs:06.3}")
        }
    }
}

/// An owned decoded frame: RGB24 pixels at the source's native resolution.
///
/// The backing buffer maps to a scarce decode surface, so holders drop the
/// frame as soon as the encoder or snapshot consumer is done with it.
#[derive(Debug)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    timestamp: f64,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>, timestamp: f64) -> ExportResult<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() != expected {
            return Err(ExportError::DecodeFailure {
                message: format!(
                    "Frame buffer size mismatch: {}x{} needs {expected} bytes, got {}",
                    width,
                    height,
                    rgb.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            rgb,
            timestamp,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source timestamp in seconds of the decoded picture.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }
}

/// The finished export: one complete, immutable byte buffer plus its media
/// type. Never constructed from partial output.
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    bytes: Vec<u8>,
    media_type: &'static str,
}

impl EncodedArtifact {
    pub fn new(bytes: Vec<u8>, media_type: &'static str) -> Self {
        Self { bytes, media_type }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
