//! FFmpeg frame-level encoder: VP9/VP8 into a WebM container.
//!
//! Muxing goes through a scratch file because libavformat wants a seekable
//! sink for the container trailer; the finished bytes are read back into
//! one immutable artifact on finalize.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::format::Pixel;
use ffmpeg_next::{codec, encoder, format, frame, picture, Rational};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::model::{EncodedArtifact, EncoderConfig, OutputFormat, RasterFrame, VideoCodec};
use crate::error::{ExportError, ExportResult};
use crate::pipeline::deterministic::{EncoderFactory, FrameEncoder};

fn codec_id(codec: VideoCodec) -> codec::Id {
    match codec {
        VideoCodec::Vp9 => codec::Id::VP9,
        VideoCodec::Vp8 => codec::Id::VP8,
        VideoCodec::H264 => codec::Id::H264,
    }
}

pub struct FfmpegFrameEncoder {
    output: format::context::Output,
    encoder: encoder::Video,
    scaler: scaling::Context,
    stream_time_base: Rational,
    encoder_time_base: Rational,
    scratch: NamedTempFile,
}

// SAFETY: `scaling::Context` holds a raw `SwsContext` pointer with no thread
// affinity; the encoder is only ever used from one thread at a time.
unsafe impl Send for FfmpegFrameEncoder {}

impl FfmpegFrameEncoder {
    fn configure(config: &EncoderConfig) -> ExportResult<Self> {
        crate::media::init()?;
        let scratch = tempfile::Builder::new()
            .prefix("framecut-")
            .suffix(".webm")
            .tempfile()?;
        let mut output = format::output_as(&scratch.path(), "webm")?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let codec = encoder::find(codec_id(config.codec)).ok_or_else(|| {
            ExportError::UnsupportedConfiguration {
                message: format!("No {} encoder available", config.codec.name()),
            }
        })?;
        let mut ost = output.add_stream(codec)?;

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        let encoder_time_base = Rational(1, config.fps as i32);
        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(Rational(config.fps as i32, 1)));
        video.set_bit_rate(config.bitrate as usize);
        video.set_gop(config.keyframe_interval);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let opened = video
            .open_as(codec)
            .map_err(|e| ExportError::UnsupportedConfiguration {
                message: format!(
                    "{} rejected {}x{}@{} {}bps: {e}",
                    config.codec.name(),
                    config.width,
                    config.height,
                    config.fps,
                    config.bitrate
                ),
            })?;
        ost.set_parameters(&opened);
        ost.set_time_base(encoder_time_base);
        output.write_header()?;
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            config.width,
            config.height,
            Pixel::YUV420P,
            config.width,
            config.height,
            scaling::Flags::BILINEAR,
        )?;

        debug!(codec = config.codec.name(), "Encoder configured");
        Ok(Self {
            output,
            encoder: opened,
            scaler,
            stream_time_base,
            encoder_time_base,
            scratch,
        })
    }

    /// Write out every packet the encoder has ready. Returns bytes muxed.
    fn drain(&mut self) -> ExportResult<u64> {
        let mut written = 0u64;
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            written += packet.size() as u64;
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| ExportError::encode("mux", e.to_string()))?;
        }
        Ok(written)
    }

    fn to_yuv(&mut self, raster: &RasterFrame) -> ExportResult<frame::Video> {
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
        Ok(yuv)
    }
}

impl FrameEncoder for FfmpegFrameEncoder {
    fn submit(&mut self, raster: &RasterFrame, pts: i64, keyframe: bool) -> ExportResult<u64> {
        let mut yuv = self.to_yuv(raster)?;
        yuv.set_pts(Some(pts));
        if keyframe {
            yuv.set_kind(picture::Type::I);
        }
        self.encoder
            .send_frame(&yuv)
            .map_err(|e| ExportError::encode("submit", e.to_string()))?;
        self.drain()
    }

    fn finish(mut self: Box<Self>) -> ExportResult<EncodedArtifact> {
        self.encoder
            .send_eof()
            .map_err(|e| ExportError::encode("flush", e.to_string()))?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(|e| ExportError::encode("finalize", e.to_string()))?;
        let bytes = std::fs::read(self.scratch.path())?;
        if bytes.is_empty() {
            return Err(ExportError::encode("finalize", "Container came out empty"));
        }
        Ok(EncodedArtifact::new(bytes, OutputFormat::Webm.media_type()))
    }
}

/// Encode one thumbnail as a JPEG file through the MJPEG encoder.
pub fn write_jpeg(thumb: &crate::thumbs::Thumbnail, path: &std::path::Path) -> ExportResult<()> {
    crate::media::init()?;
    let codec = encoder::find(codec::Id::MJPEG).ok_or_else(|| ExportError::Runtime {
        message: "No MJPEG encoder available".into(),
    })?;
    let mut video = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    video.set_width(thumb.width);
    video.set_height(thumb.height);
    video.set_format(Pixel::YUVJ420P);
    video.set_time_base(Rational(1, 1));
    let mut opened = video.open_as(codec)?;

    let mut rgb = frame::Video::new(Pixel::RGB24, thumb.width, thumb.height);
    let stride = rgb.stride(0);
    let row = thumb.width as usize * 3;
    let data = rgb.data_mut(0);
    for y in 0..thumb.height as usize {
        data[y * stride..y * stride + row].copy_from_slice(&thumb.rgb[y * row..(y + 1) * row]);
    }
    let mut scaler = scaling::Context::get(
        Pixel::RGB24,
        thumb.width,
        thumb.height,
        Pixel::YUVJ420P,
        thumb.width,
        thumb.height,
        scaling::Flags::BILINEAR,
    )?;
    let mut yuv = frame::Video::empty();
    scaler.run(&rgb, &mut yuv)?;
    yuv.set_pts(Some(0));

    opened.send_frame(&yuv)?;
    opened.send_eof()?;
    let mut packet = ffmpeg::Packet::empty();
    let mut bytes = Vec::new();
    while opened.receive_packet(&mut packet).is_ok() {
        if let Some(data) = packet.data() {
            bytes.extend_from_slice(data);
        }
    }
    if bytes.is_empty() {
        return Err(ExportError::Runtime {
            message: "MJPEG encoder produced no data".into(),
        });
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct FfmpegEncoderFactory;

impl EncoderFactory for FfmpegEncoderFactory {
    fn configure(&self, config: &EncoderConfig) -> ExportResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(FfmpegFrameEncoder::configure(config)?))
    }
}
