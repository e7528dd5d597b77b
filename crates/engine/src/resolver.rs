use tracing::debug;

use crate::segment::Segment;
use crate::time::{AbsoluteTime, Direction, VideoOffset, clamp_time};

/// A timeline point resolved to a concrete video file position.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub segment: Segment,
    pub offset: VideoOffset,
    /// Requested time after clamping to the recorded range.
    pub clamped_time: AbsoluteTime,
}

/// Resolves `time` against an ordered, non-overlapping segment list.
///
/// Times before the first or after the last segment clamp to the recorded
/// range. Times inside a gap resolve to the neighbor in the direction of
/// travel; with [`Direction::Still`] the nearer neighbor wins, and an exact
/// tie goes to the earlier segment. When two segments touch, the shared
/// instant belongs to the later one.
///
/// # Example
/// ```
/// use std::path::PathBuf;
/// use playback_engine::{Direction, Segment, resolve};
///
/// let segment = |id: &str, start_ts: f64, end_ts: f64| Segment {
///     id: id.into(),
///     start_ts,
///     end_ts,
///     frame_count: 300,
///     fps: Some(30.0),
///     video_path: PathBuf::from(format!("{id}.mp4")),
/// };
/// let segments = [segment("a", 1_000.0, 1_100.0), segment("b", 1_200.0, 1_300.0)];
///
/// let forward = resolve(&segments, 1_150.0, Direction::Forward).unwrap();
/// assert_eq!((forward.segment.id.as_str(), forward.offset), ("b", 0.0));
///
/// let backward = resolve(&segments, 1_150.0, Direction::Backward).unwrap();
/// assert_eq!((backward.segment.id.as_str(), backward.offset), ("a", 10.0));
/// ```
pub fn resolve(segments: &[Segment], time: AbsoluteTime, direction: Direction) -> Option<Resolved> {
    let first = segments.first()?;
    let last = segments.last()?;
    let clamped = clamp_time(time, first.start_ts, last.end_ts);

    // Index of the last segment starting at or before `clamped`; always >= 1
    // because `clamped >= first.start_ts`.
    let after = segments.partition_point(|segment| segment.start_ts <= clamped);
    let previous = &segments[after.saturating_sub(1)];

    if clamped <= previous.end_ts {
        return Some(at(previous, clamped, clamped));
    }

    let Some(next) = segments.get(after) else {
        return Some(at(previous, previous.end_ts, clamped));
    };

    let chosen_previous = match direction {
        Direction::Forward => false,
        Direction::Backward => true,
        Direction::Still => clamped - previous.end_ts <= next.start_ts - clamped,
    };
    debug!(
        time = clamped,
        ?direction,
        previous = %previous.id,
        next = %next.id,
        chosen_previous,
        "resolved time inside a gap"
    );

    Some(if chosen_previous {
        at(previous, previous.end_ts, clamped)
    } else {
        at(next, next.start_ts, clamped)
    })
}

fn at(segment: &Segment, time: AbsoluteTime, clamped_time: AbsoluteTime) -> Resolved {
    Resolved {
        segment: segment.clone(),
        offset: segment.video_offset(time),
        clamped_time,
    }
}
