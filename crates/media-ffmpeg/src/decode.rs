use std::path::Path;

use tracing::debug;

use crate::error::{MediaFfmpegError, Result};
use crate::probe::{VideoProbe, probe_video};
use crate::tools::{Tools, run};

/// Distance kept from the end of the stream when seeking for a still.
///
/// Seeking exactly to the container duration yields no frame at all.
const END_OF_STREAM_MARGIN_SECONDS: f64 = 0.05;

/// A decoded video frame in RGBA format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Decodes a single RGBA frame at (or just before the end of) `at_seconds`.
///
/// Uses input seeking, so the returned frame is the first one decoded after
/// the nearest keyframe preceding the target with accurate seek enabled.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::{Tools, decode_frame_near_seconds};
///
/// let frame = decode_frame_near_seconds(&Tools::default(), "segment.mp4", 0.5)
///     .expect("decode should succeed");
/// assert!(!frame.rgba.is_empty());
/// ```
pub fn decode_frame_near_seconds(
    tools: &Tools,
    path: impl AsRef<Path>,
    at_seconds: f64,
) -> Result<DecodedVideoFrame> {
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTimestampSeconds(at_seconds));
    }

    let path = path.as_ref();
    let probe = probe_video(tools, path)?;
    let seek_seconds = clamp_to_stream(&probe, at_seconds);

    let rgba = decode_rgba_at(tools, path, seek_seconds)?;
    let rgba = if rgba.is_empty() && seek_seconds > 0.0 {
        debug!(
            path = %path.display(),
            seek_seconds,
            "no frame after seek point, falling back to first frame"
        );
        decode_rgba_at(tools, path, 0.0)?
    } else {
        rgba
    };

    let expected_size = probe.width as usize * probe.height as usize * 4;
    if rgba.len() != expected_size {
        return Err(MediaFfmpegError::Parse {
            context: "decoded rgba size",
            value: format!("expected {expected_size} bytes, got {}", rgba.len()),
        });
    }

    Ok(DecodedVideoFrame {
        width: probe.width,
        height: probe.height,
        rgba,
    })
}

fn clamp_to_stream(probe: &VideoProbe, at_seconds: f64) -> f64 {
    match probe.playable_seconds() {
        Some(duration) if duration > END_OF_STREAM_MARGIN_SECONDS => {
            at_seconds.min(duration - END_OF_STREAM_MARGIN_SECONDS)
        }
        Some(_) => 0.0,
        None => at_seconds,
    }
}

fn decode_rgba_at(tools: &Tools, path: &Path, seek_seconds: f64) -> Result<Vec<u8>> {
    let mut command = tools.ffmpeg();
    command
        .args(["-hide_banner", "-v", "error", "-accurate_seek", "-ss"])
        .arg(format!("{seek_seconds:.6}"))
        .arg("-i")
        .arg(path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"]);

    let output = run(
        command,
        "run ffmpeg decode frame",
        format!("ffmpeg decode frame {} at {seek_seconds:.3}s", path.display()),
    )?;
    Ok(output.stdout)
}
