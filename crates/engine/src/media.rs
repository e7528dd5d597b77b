use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use media_ffmpeg::Tools;
use tracing::debug;

use crate::error::MediaError;
use crate::segment::{Segment, SegmentId};
use crate::time::VideoOffset;

/// Decoded still image, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillFrame {
    pub width: u32,
    pub height: u32,
    pub bytes: Arc<[u8]>,
}

/// A segment video opened and ready to hand to a [`MediaOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHandle {
    pub path: PathBuf,
    /// Playable length of the file in seconds, when known.
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
}

/// Media operations the session needs from the filesystem.
///
/// Implementations are called from worker threads.
pub trait MediaBackend: Send + Sync {
    /// Opens `path` for playback.
    fn open(&self, path: &Path) -> Result<MediaHandle, MediaError>;

    /// Decodes one frame near `offset` seconds into the file.
    fn decode_still(&self, path: &Path, offset: VideoOffset) -> Result<StillFrame, MediaError>;
}

/// FFmpeg CLI-backed backend used by production wiring.
#[derive(Debug, Default, Clone)]
pub struct FfmpegMediaBackend {
    tools: Tools,
}

impl FfmpegMediaBackend {
    pub fn new(tools: Tools) -> Self {
        Self { tools }
    }

    /// Backend using tool locations from the environment.
    pub fn from_env() -> Self {
        Self::new(Tools::from_env())
    }
}

impl MediaBackend for FfmpegMediaBackend {
    fn open(&self, path: &Path) -> Result<MediaHandle, MediaError> {
        media_ffmpeg::ensure_readable(path).map_err(|error| MediaError::from_load(path, error))?;
        let probe = media_ffmpeg::probe_video(&self.tools, path)
            .map_err(|error| MediaError::from_load(path, error))?;
        debug!(
            path = %path.display(),
            duration = ?probe.playable_seconds(),
            width = probe.width,
            height = probe.height,
            "opened segment video"
        );
        Ok(MediaHandle {
            duration: probe.playable_seconds(),
            width: probe.width,
            height: probe.height,
            path: probe.path,
        })
    }

    fn decode_still(&self, path: &Path, offset: VideoOffset) -> Result<StillFrame, MediaError> {
        let decoded = media_ffmpeg::decode_frame_near_seconds(&self.tools, path, offset.max(0.0))
            .map_err(|error| MediaError::from_decode(path, error))?;
        Ok(StillFrame {
            width: decoded.width,
            height: decoded.height,
            bytes: decoded.rgba.into(),
        })
    }
}

/// The single live output a session drives.
///
/// Owned exclusively by the session context; never shared with workers.
pub trait MediaOutput {
    /// Replaces the loaded source. Playback is left paused at offset 0.
    ///
    /// Surfaces that render video should keep the last presented frame
    /// until the new source produces one.
    fn replace_source(&mut self, segment: &Segment, handle: MediaHandle) -> Result<(), MediaError>;

    /// Unloads the current source.
    fn clear_source(&mut self);

    /// Seeks the loaded source with zero tolerance.
    fn seek(&mut self, offset: VideoOffset) -> Result<(), MediaError>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Segment whose source is loaded.
    fn loaded_segment(&self) -> Option<&SegmentId>;

    /// Current playback position within the loaded source.
    fn position(&self) -> Option<VideoOffset>;
}

#[derive(Debug, Clone)]
struct HeadlessSource {
    segment_id: SegmentId,
    duration: Option<f64>,
}

/// Media output without a video surface, advancing with the wall clock.
#[derive(Debug, Default)]
pub struct HeadlessOutput {
    source: Option<HeadlessSource>,
    anchor_offset: VideoOffset,
    playing_since: Option<Instant>,
}

impl HeadlessOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    fn position_at(&self, now: Instant) -> Option<VideoOffset> {
        let source = self.source.as_ref()?;
        let elapsed = self
            .playing_since
            .map(|since| now.saturating_duration_since(since).as_secs_f64())
            .unwrap_or(0.0);
        let position = self.anchor_offset + elapsed;
        Some(match source.duration {
            Some(duration) => position.min(duration),
            None => position,
        })
    }
}

impl MediaOutput for HeadlessOutput {
    fn replace_source(&mut self, segment: &Segment, handle: MediaHandle) -> Result<(), MediaError> {
        self.source = Some(HeadlessSource {
            segment_id: segment.id.clone(),
            duration: handle.duration.or_else(|| segment.video_duration()),
        });
        self.anchor_offset = 0.0;
        self.playing_since = None;
        Ok(())
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.anchor_offset = 0.0;
        self.playing_since = None;
    }

    fn seek(&mut self, offset: VideoOffset) -> Result<(), MediaError> {
        let Some(source) = &self.source else {
            return Err(MediaError::Seek {
                detail: "no source loaded".to_string(),
            });
        };
        if !offset.is_finite() {
            return Err(MediaError::Seek {
                detail: format!("invalid offset {offset}"),
            });
        }
        let upper = source.duration.unwrap_or(f64::INFINITY);
        self.anchor_offset = offset.clamp(0.0, upper);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn play(&mut self) {
        if self.source.is_some() && self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        let now = Instant::now();
        if let Some(position) = self.position_at(now) {
            self.anchor_offset = position;
        }
        self.playing_since = None;
    }

    fn loaded_segment(&self) -> Option<&SegmentId> {
        self.source.as_ref().map(|source| &source.segment_id)
    }

    fn position(&self) -> Option<VideoOffset> {
        self.position_at(Instant::now())
    }
}
