//! FFmpeg decode source: demux, decode, scale to RGB24.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::format::Pixel;
use ffmpeg_next::{codec, format, frame, media};
use tracing::debug;

use crate::domain::model::{snap_fps, RasterFrame, SourceMetadata};
use crate::error::{ExportError, ExportResult};
use crate::sampler::{DecodeSource, SeekOutcome, SourceFactory};

pub struct FfmpegSource {
    input: format::context::Input,
    decoder: codec::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    metadata: SourceMetadata,
    position: f64,
    pending: Option<frame::Video>,
}

// SAFETY: `scaling::Context` holds a raw `SwsContext` pointer with no thread
// affinity; the source is only ever used from one thread at a time.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    pub fn open(path: &Path) -> ExportResult<Self> {
        crate::media::init()?;
        let input = format::input(&path).map_err(|e| ExportError::ProbeFailure {
            message: format!("Cannot open {}: {e}", path.display()),
        })?;
        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| ExportError::ProbeFailure {
                message: format!("No video stream in {}", path.display()),
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let fps = snap_fps(f64::from(stream.avg_frame_rate()));

        let decoder = codec::context::Context::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        let metadata = SourceMetadata {
            duration: input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE),
            width: decoder.width(),
            height: decoder.height(),
            fps,
        };
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            metadata,
            position: 0.0,
            pending: None,
        })
    }

    fn frame_seconds(&self, frame: &frame::Video) -> f64 {
        frame.timestamp().unwrap_or(0) as f64 * f64::from(self.time_base)
    }

    /// Pull the next decoded frame from the stream, feeding packets until
    /// the decoder produces one or the stream ends.
    fn decode_next(&mut self) -> ExportResult<Option<frame::Video>> {
        let mut decoded = frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(Some(decoded));
            }
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof()?;
                    return if self.decoder.receive_frame(&mut decoded).is_ok() {
                        Ok(Some(decoded))
                    } else {
                        Ok(None)
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode forward until a frame at or past `timestamp` appears or the
    /// deadline expires. The best frame seen stays pending either way.
    fn settle_on(&mut self, timestamp: f64, wait: Duration) -> ExportResult<SeekOutcome> {
        let deadline = Instant::now() + wait;
        loop {
            match self.decode_next()? {
                Some(frame) => {
                    let seconds = self.frame_seconds(&frame);
                    self.position = seconds;
                    self.pending = Some(frame);
                    if seconds + f64::from(self.time_base) / 2.0 >= timestamp {
                        return Ok(SeekOutcome::Ready);
                    }
                }
                // Stream exhausted; the last frame is as close as it gets.
                None => return Ok(SeekOutcome::Ready),
            }
            if Instant::now() >= deadline {
                debug!(timestamp, position = self.position, "Seek deadline expired");
                return Ok(SeekOutcome::TimedOut);
            }
        }
    }
}

/// Small forward steps keep decoding through the current GOP; going
/// backwards or jumping more than a second re-enters from the preceding
/// keyframe instead.
fn needs_demux_seek(current: f64, target: f64) -> bool {
    target < current || target > current + 1.0
}

impl DecodeSource for FfmpegSource {
    fn seek(&mut self, timestamp: f64, wait: Duration) -> ExportResult<SeekOutcome> {
        if needs_demux_seek(self.position, timestamp) {
            let target =
                (timestamp * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
            self.input.seek(target, ..target)?;
            self.decoder.flush();
            self.pending = None;
        }
        self.settle_on(timestamp, wait)
    }

    fn grab_frame(&mut self) -> ExportResult<RasterFrame> {
        let decoded = match self.pending.take() {
            Some(frame) => frame,
            None => self.decode_next()?.ok_or_else(|| ExportError::DecodeFailure {
                message: "Source has no more frames".into(),
            })?,
        };
        let seconds = self.frame_seconds(&decoded);

        let mut rgb = frame::Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;

        let width = rgb.width();
        let height = rgb.height();
        let stride = rgb.stride(0);
        let row = width as usize * 3;
        let mut pixels = Vec::with_capacity(row * height as usize);
        let data = rgb.data(0);
        for y in 0..height as usize {
            pixels.extend_from_slice(&data[y * stride..y * stride + row]);
        }
        RasterFrame::new(width, height, pixels, seconds)
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn metadata(&self) -> SourceMetadata {
        self.metadata
    }
}

/// Opens an independent decode context per call, so concurrent samplers
/// never contend on one demuxer.
pub struct FfmpegSourceFactory {
    path: PathBuf,
}

impl FfmpegSourceFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceFactory for FfmpegSourceFactory {
    fn open(&self) -> ExportResult<Box<dyn DecodeSource>> {
        Ok(Box::new(FfmpegSource::open(&self.path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::needs_demux_seek;

    #[test]
    fn forward_steps_within_a_second_decode_through() {
        assert!(!needs_demux_seek(2.0, 2.04));
        assert!(!needs_demux_seek(2.0, 2.0));
        assert!(!needs_demux_seek(0.0, 1.0));
    }

    #[test]
    fn backwards_and_far_jumps_reseek_the_container() {
        assert!(needs_demux_seek(2.0, 1.9));
        assert!(needs_demux_seek(2.0, 4.0));
        assert!(needs_demux_seek(0.0, 2.0));
    }
}
