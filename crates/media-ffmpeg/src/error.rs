use std::path::PathBuf;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, MediaFfmpegError>;

/// Error type for probing and still-frame decoding backed by FFmpeg CLI tools.
#[derive(Debug, thiserror::Error)]
pub enum MediaFfmpegError {
    #[error("invalid rational {num}/{den}")]
    InvalidRational { num: i32, den: i32 },

    #[error("invalid timestamp seconds: {0}")]
    InvalidTimestampSeconds(f64),

    #[error("video file not found: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("permission denied reading video file: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("video stream not found: {}", .0.display())]
    MissingVideoStream(PathBuf),

    #[error("video dimensions missing: {}", .0.display())]
    MissingVideoDimensions(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed ({status}): {command}; stderr: {}", .stderr.trim())]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("utf8 decode error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("ffprobe json output is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse error ({context}): {value}")]
    Parse {
        context: &'static str,
        value: String,
    },
}

impl MediaFfmpegError {
    /// Returns true when the error means the file itself is absent.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, Self::FileMissing(_))
    }
}
