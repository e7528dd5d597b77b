use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{MediaFfmpegError, Result};

const FFMPEG_ENV: &str = "PLAYBACK_FFMPEG";
const FFPROBE_ENV: &str = "PLAYBACK_FFPROBE";

/// Locations of the FFmpeg command line tools.
///
/// Defaults to `ffmpeg` / `ffprobe` on `PATH`; `PLAYBACK_FFMPEG` and
/// `PLAYBACK_FFPROBE` override them with explicit binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub ffmpeg: OsString,
    pub ffprobe: OsString,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: OsString::from("ffmpeg"),
            ffprobe: OsString::from("ffprobe"),
        }
    }
}

impl Tools {
    /// Resolves tool locations from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: std::env::var_os(FFMPEG_ENV).unwrap_or(defaults.ffmpeg),
            ffprobe: std::env::var_os(FFPROBE_ENV).unwrap_or(defaults.ffprobe),
        }
    }

    /// Returns true when both tools answer `-version`.
    pub fn available(&self) -> bool {
        answers_version(&self.ffmpeg) && answers_version(&self.ffprobe)
    }

    pub(crate) fn ffprobe(&self) -> Command {
        Command::new(&self.ffprobe)
    }

    pub(crate) fn ffmpeg(&self) -> Command {
        Command::new(&self.ffmpeg)
    }
}

fn answers_version(program: &OsString) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Maps filesystem access problems to dedicated errors before spawning tools.
///
/// `ffprobe` reports a missing file and an unreadable file with the same exit
/// status, so the distinction has to be made up front.
pub fn ensure_readable(path: &Path) -> Result<()> {
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(error) => match error.kind() {
            std::io::ErrorKind::NotFound => Err(MediaFfmpegError::FileMissing(path.to_path_buf())),
            std::io::ErrorKind::PermissionDenied => {
                Err(MediaFfmpegError::PermissionDenied(path.to_path_buf()))
            }
            _ => Err(MediaFfmpegError::Io {
                context: "open video file",
                source: error,
            }),
        },
    }
}

pub(crate) fn run(mut command: Command, context: &'static str, display: String) -> Result<Output> {
    let output = command
        .output()
        .map_err(|source| MediaFfmpegError::Io { context, source })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: display,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output)
}
