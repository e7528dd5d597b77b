use std::path::{Path, PathBuf};

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced while setting up the engine: store access and configuration.
///
/// Playback itself never returns these across its public operations; load and
/// seek problems are folded into [`PlaybackErrorKind`] instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("segment store query failed ({}): {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {} ({source})", .path.display())]
    ConfigIo {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} is not valid TOML: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("media backend error: {0}")]
    Media(#[from] MediaError),
}

impl EngineError {
    pub(crate) fn store(path: &Path, source: rusqlite::Error) -> Self {
        Self::Store {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure reported by a media backend or media output.
///
/// Travels between worker threads and the session context, so it only
/// carries owned, cloneable data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("video file missing: {}", .0.display())]
    FileMissing(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("failed to load {}: {detail}", .path.display())]
    Load { path: PathBuf, detail: String },

    #[error("failed to decode still from {}: {detail}", .path.display())]
    Decode { path: PathBuf, detail: String },

    #[error("seek failed: {detail}")]
    Seek { detail: String },
}

impl MediaError {
    /// Classifies an FFmpeg tool error raised while opening `path`.
    pub fn from_load(path: &Path, error: media_ffmpeg::MediaFfmpegError) -> Self {
        match error {
            media_ffmpeg::MediaFfmpegError::FileMissing(path) => Self::FileMissing(path),
            media_ffmpeg::MediaFfmpegError::PermissionDenied(path) => Self::PermissionDenied(path),
            other => Self::Load {
                path: path.to_path_buf(),
                detail: other.to_string(),
            },
        }
    }

    /// Classifies an FFmpeg tool error raised while decoding a still.
    pub fn from_decode(path: &Path, error: media_ffmpeg::MediaFfmpegError) -> Self {
        match error {
            media_ffmpeg::MediaFfmpegError::FileMissing(path) => Self::FileMissing(path),
            media_ffmpeg::MediaFfmpegError::PermissionDenied(path) => Self::PermissionDenied(path),
            other => Self::Decode {
                path: path.to_path_buf(),
                detail: other.to_string(),
            },
        }
    }
}

/// Non-fatal playback error state observable by the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackErrorKind {
    #[error("video file missing: {}", .0.display())]
    VideoFileMissing(PathBuf),

    #[error("segment failed to load: {0}")]
    SegmentLoadFailure(String),

    #[error("permission denied while opening recordings")]
    PermissionDenied,

    #[error("{0} consecutive playback failures")]
    RepeatedFailures(u32),
}

impl PlaybackErrorKind {
    /// Maps a media failure to the UI taxonomy.
    ///
    /// Once `consecutive_failures` reaches `threshold` the individual cause is
    /// replaced by [`PlaybackErrorKind::RepeatedFailures`].
    pub fn classify(error: &MediaError, consecutive_failures: u32, threshold: u32) -> Self {
        if consecutive_failures >= threshold {
            return Self::RepeatedFailures(consecutive_failures);
        }

        match error {
            MediaError::FileMissing(path) => Self::VideoFileMissing(path.clone()),
            MediaError::PermissionDenied(_) => Self::PermissionDenied,
            other => Self::SegmentLoadFailure(other.to_string()),
        }
    }
}
