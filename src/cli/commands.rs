//! Command execution: wire the real adapters into the library surface.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Tuning;
use crate::domain::model::{OutputFormat, TimeSpec, TranscodeRequest};
use crate::error::{ExportError, ExportResult};
use crate::media::{FfmpegEncoderFactory, FfmpegProbe, FfmpegRecorderFactory, FfmpegSourceFactory};
use crate::pipeline::Exporter;
use crate::progress::{CancelToken, JsonProgress, ProgressSink};
use crate::thumbs::ThumbnailGenerator;

use super::args::{ClipArgs, InspectArgs, ThumbsArgs};

fn progress_sink(json: bool) -> ProgressSink {
    if json {
        JsonProgress::sink()
    } else {
        ProgressSink::new(|percent| {
            print!("\rProgress: {percent:5.1}%");
            let _ = std::io::stdout().flush();
        })
    }
}

/// Map the thumbnail flags onto the width-derived sizing rule. An explicit
/// count must fit the configured bounds so it comes back out unclamped.
fn thumb_display_width(count: Option<usize>, width: u32, tuning: &Tuning) -> ExportResult<u32> {
    match count {
        Some(n) if n < tuning.thumb_min_count || n > tuning.thumb_max_count => {
            Err(ExportError::invalid(format!(
                "Thumbnail count {n} is outside {}..={}",
                tuning.thumb_min_count, tuning.thumb_max_count
            )))
        }
        Some(n) => Ok(n as u32 * 80),
        None => Ok(width),
    }
}

/// Cancel the token on Ctrl-C so pipelines shut down cleanly.
fn hook_ctrl_c(cancel: &CancelToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

pub async fn execute_clip(args: ClipArgs, config: Option<&Path>, json: bool) -> ExportResult<()> {
    let tuning = Tuning::load_or_default(config)?;
    let metadata = FfmpegProbe::metadata(&args.input)?;
    let start = TimeSpec::parse(&args.start)?;
    let end = TimeSpec::parse(&args.end)?;
    let request = TranscodeRequest {
        input: args.input.display().to_string(),
        start: start.seconds(),
        end: end.seconds(),
        format: OutputFormat::parse(&args.format)?,
        quality: args.quality,
        bitrate: args.bitrate,
        fps: args.fps.unwrap_or(metadata.fps),
    };

    let exporter = Exporter::new(
        metadata,
        Arc::new(FfmpegProbe),
        Arc::new(FfmpegSourceFactory::new(&args.input)),
        Arc::new(FfmpegEncoderFactory),
        Arc::new(FfmpegRecorderFactory),
        tuning,
    );

    let cancel = CancelToken::new();
    hook_ctrl_c(&cancel);
    if json {
        JsonProgress::start(&request.input);
    }

    let result = exporter
        .export(request, progress_sink(json), cancel)
        .await;
    if !json {
        println!();
    }
    match result {
        Ok(artifact) => {
            std::fs::write(&args.output, artifact.bytes())?;
            info!(
                output = %args.output.display(),
                bytes = artifact.len(),
                media_type = artifact.media_type(),
                "Clip written"
            );
            if json {
                JsonProgress::complete(artifact.len());
            }
            Ok(())
        }
        Err(e) => {
            if json {
                JsonProgress::error(&e.to_string());
            }
            Err(e)
        }
    }
}

pub async fn execute_thumbs(args: ThumbsArgs, config: Option<&Path>, json: bool) -> ExportResult<()> {
    let tuning = Tuning::load_or_default(config)?;
    let metadata = FfmpegProbe::metadata(&args.input)?;
    let display_width = thumb_display_width(args.count, args.width, &tuning)?;

    let generator = ThumbnailGenerator::new(
        Arc::new(FfmpegSourceFactory::new(&args.input)),
        metadata,
        tuning,
    );
    let cancel = CancelToken::new();
    hook_ctrl_c(&cancel);

    let strip = generator
        .generate(display_width, progress_sink(json), cancel)
        .await?;
    if !json {
        println!();
    }

    std::fs::create_dir_all(&args.out_dir)?;
    for thumb in &strip {
        let path = args.out_dir.join(format!("thumb_{:03}.jpg", thumb.index));
        crate::media::engine::write_jpeg(thumb, &path)?;
    }
    info!(count = strip.len(), dir = %args.out_dir.display(), "Thumbnail strip written");
    Ok(())
}

pub async fn execute_inspect(args: InspectArgs) -> ExportResult<()> {
    let metadata = FfmpegProbe::metadata(&args.input)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metadata).unwrap_or_default());
    } else {
        println!("Duration:   {:.3}s", metadata.duration);
        println!("Resolution: {}x{}", metadata.width, metadata.height);
        println!("Frame rate: {} fps", metadata.fps);
    }
    Ok(())
}
