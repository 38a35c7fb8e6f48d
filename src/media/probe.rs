//! Capability and metadata probing.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::format::Pixel;
use ffmpeg_next::{codec, encoder, format, media, Rational};
use tracing::debug;

use crate::domain::model::{snap_fps, EncoderConfig, SourceMetadata, VideoCodec};
use crate::error::{ExportError, ExportResult};
use crate::negotiator::CapabilityProbe;

#[derive(Debug, Default)]
pub struct FfmpegProbe;

impl FfmpegProbe {
    /// Read duration, native resolution and a snapped frame rate.
    pub fn metadata(path: &Path) -> ExportResult<SourceMetadata> {
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
        debug!(?metadata, path = %path.display(), "Probed source");
        Ok(metadata)
    }

    fn codec_id(codec: VideoCodec) -> codec::Id {
        match codec {
            VideoCodec::Vp9 => codec::Id::VP9,
            VideoCodec::Vp8 => codec::Id::VP8,
            VideoCodec::H264 => codec::Id::H264,
        }
    }

    /// Actually open an encoder with the requested knobs; the only reliable
    /// way to know libav accepts the combination.
    fn try_open(config: &EncoderConfig) -> ExportResult<()> {
        crate::media::init()?;
        let codec = encoder::find(Self::codec_id(config.codec)).ok_or_else(|| {
            ExportError::UnsupportedConfiguration {
                message: format!("No {} encoder", config.codec.name()),
            }
        })?;
        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;
        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(Rational(1, config.fps as i32));
        video.set_frame_rate(Some(Rational(config.fps as i32, 1)));
        video.set_bit_rate(config.bitrate as usize);
        video.set_gop(config.keyframe_interval);
        video
            .open_as(codec)
            .map_err(|e| ExportError::UnsupportedConfiguration {
                message: format!("{} rejected configuration: {e}", config.codec.name()),
            })?;
        Ok(())
    }
}

impl CapabilityProbe for FfmpegProbe {
    fn supports_frame_encoding(&self) -> bool {
        if crate::media::init().is_err() {
            return false;
        }
        encoder::find(codec::Id::VP9).is_some() || encoder::find(codec::Id::VP8).is_some()
    }

    fn supports_encoder_config(&self, config: &EncoderConfig) -> bool {
        match Self::try_open(config) {
            Ok(()) => true,
            Err(e) => {
                debug!(codec = config.codec.name(), error = %e, "Configuration probe failed");
                false
            }
        }
    }
}
