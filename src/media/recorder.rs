//! FFmpeg stream recorder backing the real-time capture path.
//!
//! Frames arrive on a wall-clock cadence with an elapsed timestamp, so the
//! stream uses a millisecond time base instead of a frame-index one.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::format::Pixel;
use ffmpeg_next::{codec, encoder, format, frame, Rational};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::model::{
    EncodedArtifact, OutputFormat, RasterFrame, SourceMetadata, TranscodeRequest, VideoCodec,
};
use crate::error::{ExportError, ExportResult};
use crate::pipeline::realtime::{RecorderFactory, StreamRecorder};

const MS_TIME_BASE: Rational = Rational(1, 1000);

pub struct FfmpegRecorder {
    output: format::context::Output,
    encoder: encoder::Video,
    scaler: scaling::Context,
    stream_time_base: Rational,
    format: OutputFormat,
    scratch: NamedTempFile,
    started: bool,
    last_pts: i64,
}

// SAFETY: `scaling::Context` holds a raw `SwsContext` pointer with no thread
// affinity; the recorder is only ever used from one thread at a time.
unsafe impl Send for FfmpegRecorder {}

impl FfmpegRecorder {
    fn create(request: &TranscodeRequest, metadata: &SourceMetadata) -> ExportResult<Self> {
        crate::media::init()?;
        let (codec_kind, container) = match request.format {
            OutputFormat::Webm => (VideoCodec::Vp8, "webm"),
            OutputFormat::Mp4 => (VideoCodec::H264, "mp4"),
        };
        let scratch = tempfile::Builder::new()
            .prefix("framecut-rec-")
            .suffix(&format!(".{}", request.format.extension()))
            .tempfile()?;
        let mut output = format::output_as(&scratch.path(), container)?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let id = match codec_kind {
            VideoCodec::Vp8 => codec::Id::VP8,
            _ => codec::Id::H264,
        };
        let codec = encoder::find(id).ok_or_else(|| ExportError::CaptureFailure {
            message: format!("No {} encoder available for recording", codec_kind.name()),
        })?;
        let mut ost = output.add_stream(codec)?;

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        video.set_width(metadata.width);
        video.set_height(metadata.height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(MS_TIME_BASE);
        video.set_frame_rate(Some(Rational(request.fps as i32, 1)));
        video.set_bit_rate(request.bitrate as usize);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let opened = video.open_as(codec).map_err(|e| ExportError::CaptureFailure {
            message: format!("Cannot open {} recorder: {e}", codec_kind.name()),
        })?;
        ost.set_parameters(&opened);
        ost.set_time_base(MS_TIME_BASE);

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            metadata.width,
            metadata.height,
            Pixel::YUV420P,
            metadata.width,
            metadata.height,
            scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            output,
            encoder: opened,
            scaler,
            stream_time_base: MS_TIME_BASE,
            format: request.format,
            scratch,
            started: false,
            last_pts: -1,
        })
    }

    fn drain(&mut self) -> ExportResult<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(MS_TIME_BASE, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| ExportError::capture(format!("mux failed: {e}")))?;
        }
        Ok(())
    }
}

impl StreamRecorder for FfmpegRecorder {
    fn start(&mut self) -> ExportResult<()> {
        self.output
            .write_header()
            .map_err(|e| ExportError::capture(format!("cannot start container: {e}")))?;
        self.stream_time_base = self
            .output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(MS_TIME_BASE);
        self.started = true;
        debug!(format = ?self.format, "Recorder started");
        Ok(())
    }

    fn push_frame(&mut self, raster: &RasterFrame, elapsed: f64) -> ExportResult<()> {
        if !self.started {
            return Err(ExportError::capture("push_frame before start"));
        }
        let width = raster.width();
        let height = raster.height();
        let mut rgb = frame::Video::new(Pixel::RGB24, width, height);
        let stride = rgb.stride(0);
        let row = width as usize * 3;
        let data = rgb.data_mut(0);
        for y in 0..height as usize {
            data[y * stride..y * stride + row]
                .copy_from_slice(&raster.rgb()[y * row..(y + 1) * row]);
        }
        let mut yuv = frame::Video::empty();
        self.scaler.run(&rgb, &mut yuv)?;

        // Wall-clock pts in milliseconds, forced strictly monotonic so the
        // muxer never sees a duplicate under timer jitter.
        let pts = ((elapsed * 1000.0) as i64).max(self.last_pts + 1);
        self.last_pts = pts;
        yuv.set_pts(Some(pts));
        self.encoder
            .send_frame(&yuv)
            .map_err(|e| ExportError::capture(format!("encode failed: {e}")))?;
        self.drain()
    }

    fn stop(mut self: Box<Self>) -> ExportResult<EncodedArtifact> {
        if !self.started {
            return Err(ExportError::capture("stop before start"));
        }
        self.encoder
            .send_eof()
            .map_err(|e| ExportError::capture(format!("flush failed: {e}")))?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(|e| ExportError::capture(format!("finalize failed: {e}")))?;
        let bytes = std::fs::read(self.scratch.path())?;
        if bytes.is_empty() {
            return Err(ExportError::capture("recorder produced no data"));
        }
        Ok(EncodedArtifact::new(bytes, self.format.media_type()))
    }
}

#[derive(Debug, Default)]
pub struct FfmpegRecorderFactory;

impl RecorderFactory for FfmpegRecorderFactory {
    fn create(
        &self,
        request: &TranscodeRequest,
        metadata: &SourceMetadata,
    ) -> ExportResult<Box<dyn StreamRecorder>> {
        Ok(Box::new(FfmpegRecorder::create(request, metadata)?))
    }
}
