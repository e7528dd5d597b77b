use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::time::{AbsoluteTime, VideoOffset};

/// Stable identity of a recorded segment, as stored by the recorder.
pub type SegmentId = String;

/// One encoded video file covering a contiguous slice of recorded time.
///
/// Segments are produced by the recorder and only ever read here; a refresh
/// replaces them wholesale rather than mutating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub start_ts: AbsoluteTime,
    pub end_ts: AbsoluteTime,
    pub frame_count: u64,
    /// Encoding rate; `None` when the recorder could not determine it.
    pub fps: Option<f64>,
    pub video_path: PathBuf,
}

impl Segment {
    /// Wall-clock span covered by the segment.
    pub fn duration(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    /// Length of the encoded video, `frame_count / fps`.
    ///
    /// The recorder compresses wall-clock time (one screenshot every few
    /// seconds played back at `fps`), so this is usually much shorter than
    /// [`Segment::duration`].
    pub fn video_duration(&self) -> Option<f64> {
        self.fps
            .filter(|fps| *fps > 0.0 && fps.is_finite())
            .map(|fps| self.frame_count as f64 / fps)
    }

    /// Returns true when `t` lies within `[start_ts, end_ts]`.
    pub fn contains(&self, t: AbsoluteTime) -> bool {
        self.start_ts <= t && t <= self.end_ts
    }

    /// Maps an absolute time onto an offset into the video file.
    ///
    /// Times outside the segment clamp to the first or last offset, so the
    /// mapping can be used for look-ahead and look-behind queries.
    ///
    /// # Example
    /// ```
    /// use std::path::PathBuf;
    /// use playback_engine::Segment;
    ///
    /// let segment = Segment {
    ///     id: "a".into(),
    ///     start_ts: 1_000.0,
    ///     end_ts: 1_100.0,
    ///     frame_count: 300,
    ///     fps: Some(30.0),
    ///     video_path: PathBuf::from("a.mp4"),
    /// };
    /// assert_eq!(segment.video_offset(1_050.0), 5.0);
    /// assert_eq!(segment.video_offset(2_000.0), 10.0);
    /// ```
    pub fn video_offset(&self, t: AbsoluteTime) -> VideoOffset {
        let Some(video_duration) = self.video_duration() else {
            return 0.0;
        };
        let span = self.duration();
        if span <= 0.0 || t.is_nan() {
            return 0.0;
        }

        let fraction = ((t - self.start_ts) / span).clamp(0.0, 1.0);
        fraction * video_duration
    }

    /// Inverse of [`Segment::video_offset`], clamped to the segment bounds.
    ///
    /// Exact for offsets strictly inside the video; at the clamped edges it
    /// is only idempotent.
    pub fn absolute_time(&self, offset: VideoOffset) -> AbsoluteTime {
        let Some(video_duration) = self.video_duration() else {
            return self.start_ts;
        };
        if video_duration <= 0.0 || offset.is_nan() {
            return self.start_ts;
        }

        let fraction = (offset / video_duration).clamp(0.0, 1.0);
        self.start_ts + fraction * self.duration()
    }
}
