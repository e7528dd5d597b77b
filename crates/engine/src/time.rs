/// Absolute time on the recording timeline, in seconds since the Unix epoch.
pub type AbsoluteTime = f64;

/// Offset into one segment's video file, in seconds.
pub type VideoOffset = f64;

/// Direction of travel along the timeline, used to resolve gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    /// No bias: gaps resolve to the nearer neighbor.
    Still,
}

impl Direction {
    /// Derives a direction from the sign of a timeline delta.
    ///
    /// # Example
    /// ```
    /// use playback_engine::Direction;
    ///
    /// assert_eq!(Direction::from_delta(12.5), Direction::Forward);
    /// assert_eq!(Direction::from_delta(-0.1), Direction::Backward);
    /// assert_eq!(Direction::from_delta(0.0), Direction::Still);
    /// ```
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Self::Forward
        } else if delta < 0.0 {
            Self::Backward
        } else {
            Self::Still
        }
    }
}

/// Clamps `t` into `[lower, upper]`, tolerating NaN by pinning it to `lower`.
pub(crate) fn clamp_time(
    t: AbsoluteTime,
    lower: AbsoluteTime,
    upper: AbsoluteTime,
) -> AbsoluteTime {
    if t.is_nan() {
        return lower;
    }
    t.max(lower).min(upper)
}
