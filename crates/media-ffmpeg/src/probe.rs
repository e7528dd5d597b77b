use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{MediaFfmpegError, Result};
use crate::time::Rational;
use crate::tools::{Tools, ensure_readable, run};

/// Video metadata read from `ffprobe` for one segment file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub path: PathBuf,
    pub codec_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<Rational>,
    pub frame_count: Option<u64>,
    pub duration_seconds: Option<f64>,
}

impl VideoProbe {
    /// Frames per second, when the container reports a usable rate.
    pub fn fps(&self) -> Option<f64> {
        self.frame_rate
            .filter(|rate| rate.is_positive())
            .map(Rational::as_f64)
    }

    /// Playable duration in seconds.
    ///
    /// Falls back to `frame_count / fps` when the container does not carry a
    /// duration, which happens for segments whose writer was interrupted.
    pub fn playable_seconds(&self) -> Option<f64> {
        self.duration_seconds.or_else(|| {
            let frames = self.frame_count?;
            let fps = self.fps()?;
            Some(frames as f64 / fps)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probes the first video stream of a segment file via `ffprobe`.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::{Tools, probe_video};
///
/// let probe = probe_video(&Tools::default(), "segment.mp4").expect("probe should succeed");
/// assert!(probe.width > 0);
/// ```
pub fn probe_video(tools: &Tools, path: impl AsRef<Path>) -> Result<VideoProbe> {
    let path = path.as_ref();
    ensure_readable(path)?;

    let mut command = tools.ffprobe();
    command
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_type,codec_name,width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path);
    let output = run(
        command,
        "run ffprobe video probe",
        format!("ffprobe video probe {}", path.display()),
    )?;

    let stdout = String::from_utf8(output.stdout)?;
    let probe = parse_probe_json(path, &stdout)?;
    debug!(
        path = %path.display(),
        width = probe.width,
        height = probe.height,
        fps = ?probe.fps(),
        frame_count = ?probe.frame_count,
        duration = ?probe.duration_seconds,
        "probed segment video"
    );
    Ok(probe)
}

fn parse_probe_json(path: &Path, json: &str) -> Result<VideoProbe> {
    let parsed: ProbeOutput = serde_json::from_str(json)?;
    let stream = parsed
        .streams
        .into_iter()
        .find(|stream| stream.codec_type.as_deref().is_none_or(|kind| kind == "video"))
        .ok_or_else(|| MediaFfmpegError::MissingVideoStream(path.to_path_buf()))?;

    let width = stream
        .width
        .ok_or_else(|| MediaFfmpegError::MissingVideoDimensions(path.to_path_buf()))?;
    let height = stream
        .height
        .ok_or_else(|| MediaFfmpegError::MissingVideoDimensions(path.to_path_buf()))?;

    let frame_rate = parse_rate(stream.avg_frame_rate.as_deref())
        .or_else(|| parse_rate(stream.r_frame_rate.as_deref()));
    let frame_count = parse_optional_number::<u64>(stream.nb_frames.as_deref(), "nb_frames")?;
    let stream_duration = parse_optional_number::<f64>(stream.duration.as_deref(), "duration")?;
    let duration_seconds = match stream_duration {
        Some(seconds) => Some(seconds),
        None => parse_optional_number::<f64>(
            parsed.format.and_then(|format| format.duration).as_deref(),
            "format duration",
        )?,
    };

    Ok(VideoProbe {
        path: path.to_path_buf(),
        codec_name: stream.codec_name,
        width,
        height,
        frame_rate,
        frame_count,
        duration_seconds,
    })
}

fn parse_rate(raw: Option<&str>) -> Option<Rational> {
    raw.and_then(|value| Rational::parse(value).ok())
        .filter(|rate| rate.is_positive())
}

fn parse_optional_number<T>(raw: Option<&str>, context: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    raw.parse::<T>()
        .map(Some)
        .map_err(|_| MediaFfmpegError::Parse {
            context,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::parse_probe_json;
    use crate::error::MediaFfmpegError;

    #[test]
    fn parses_stream_with_rate_frames_and_duration() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "codec_type": "video",
                "codec_name": "hevc",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30/1",
                "r_frame_rate": "30/1",
                "nb_frames": "300",
                "duration": "10.000000"
            }],
            "format": { "duration": "10.020000" }
        }"#;

        let probe = parse_probe_json(Path::new("a.mp4"), json).expect("probe json parses");

        assert_eq!(probe.width, 1920);
        assert_eq!(probe.frame_count, Some(300));
        assert_eq!(probe.fps(), Some(30.0));
        assert_eq!(probe.playable_seconds(), Some(10.0));
    }

    #[test]
    fn falls_back_to_format_duration_and_real_frame_rate() {
        let json = r#"{
            "streams": [{
                "codec_name": "h264",
                "width": 160,
                "height": 90,
                "avg_frame_rate": "0/0",
                "r_frame_rate": "25/1",
                "nb_frames": "N/A"
            }],
            "format": { "duration": "4.000000" }
        }"#;

        let probe = parse_probe_json(Path::new("a.mp4"), json).expect("probe json parses");

        assert_eq!(probe.fps(), Some(25.0));
        assert_eq!(probe.frame_count, None);
        assert_eq!(probe.duration_seconds, Some(4.0));
    }

    #[test]
    fn derives_duration_from_frames_when_container_has_none() {
        let json = r#"{
            "streams": [{
                "width": 160,
                "height": 90,
                "avg_frame_rate": "30/1",
                "nb_frames": "45"
            }]
        }"#;

        let probe = parse_probe_json(Path::new("a.mp4"), json).expect("probe json parses");
        assert_eq!(probe.playable_seconds(), Some(1.5));
    }

    #[test]
    fn empty_stream_list_is_missing_video_stream() {
        let result = parse_probe_json(Path::new("a.mp4"), r#"{"streams": []}"#);
        assert!(matches!(result, Err(MediaFfmpegError::MissingVideoStream(_))));
    }
}
