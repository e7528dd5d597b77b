use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::MediaError;
use crate::jobs::{Job, RequestId, RequestIds};
use crate::media::MediaHandle;
use crate::segment::{Segment, SegmentId};
use crate::time::VideoOffset;

#[derive(Debug, Clone)]
struct PendingPreload {
    request: RequestId,
    segment: Segment,
    deadline: Instant,
}

/// Loads the chronologically next segment ahead of the boundary.
///
/// At most one preload is in flight, and each segment triggers at most one
/// preload until the next transition. A ready handle is owned here until the
/// session adopts it with [`PreloadScheduler::take_ready`].
#[derive(Debug)]
pub struct PreloadScheduler {
    threshold: f64,
    timeout: Duration,
    triggered_for: Option<SegmentId>,
    pending: Option<PendingPreload>,
    ready: Option<(Segment, MediaHandle)>,
}

impl PreloadScheduler {
    pub fn new(threshold: f64, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            triggered_for: None,
            pending: None,
            ready: None,
        }
    }

    /// Segment whose handle is ready for adoption.
    pub fn ready_segment(&self) -> Option<&Segment> {
        self.ready.as_ref().map(|(segment, _)| segment)
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    /// Checks progress through `current` and returns a preload job once the
    /// threshold is crossed.
    pub fn on_progress(
        &mut self,
        current: &Segment,
        offset: VideoOffset,
        next: Option<&Segment>,
        ids: &mut RequestIds,
        now: Instant,
    ) -> Option<Job> {
        if self.triggered_for.as_deref() == Some(current.id.as_str()) {
            return None;
        }
        let video_duration = current.video_duration().filter(|duration| *duration > 0.0)?;
        if offset / video_duration < self.threshold {
            return None;
        }

        self.triggered_for = Some(current.id.clone());
        let Some(next) = next else {
            debug!(segment_id = %current.id, "no next segment to preload");
            return None;
        };
        if self.ready_segment().is_some_and(|ready| ready.id == next.id) {
            return None;
        }

        let request = ids.next_id();
        self.pending = Some(PendingPreload {
            request,
            segment: next.clone(),
            deadline: now + self.timeout,
        });
        debug!(
            current = %current.id,
            next = %next.id,
            request = request.0,
            "preload triggered"
        );
        Some(Job::Preload {
            request,
            segment: next.clone(),
        })
    }

    /// Applies a preload result.
    ///
    /// Results are kept only when they answer the in-flight request, arrive
    /// before the timeout and still target `upcoming`. Returns true when a
    /// handle became ready.
    pub fn on_result(
        &mut self,
        request: RequestId,
        result: Result<MediaHandle, MediaError>,
        upcoming: Option<&str>,
        now: Instant,
    ) -> bool {
        let Some(pending) = self.pending.take_if(|pending| pending.request == request) else {
            debug!(request = request.0, "dropping stale preload result");
            return false;
        };
        if now > pending.deadline {
            warn!(
                segment_id = %pending.segment.id,
                "preload finished after its timeout, discarding"
            );
            return false;
        }
        if upcoming != Some(pending.segment.id.as_str()) {
            debug!(
                segment_id = %pending.segment.id,
                "preloaded segment no longer upcoming, discarding"
            );
            return false;
        }

        match result {
            Ok(handle) => {
                info!(segment_id = %pending.segment.id, "next segment preloaded");
                self.ready = Some((pending.segment, handle));
                true
            }
            Err(error) => {
                warn!(segment_id = %pending.segment.id, %error, "preload failed");
                false
            }
        }
    }

    /// Drops an in-flight preload whose timeout has passed.
    pub fn expire(&mut self, now: Instant) {
        if let Some(pending) = self.pending.take_if(|pending| pending.deadline <= now) {
            warn!(segment_id = %pending.segment.id, "preload timed out");
        }
    }

    /// Hands over the ready handle when it belongs to `segment_id`.
    pub fn take_ready(&mut self, segment_id: &str) -> Option<MediaHandle> {
        self.ready
            .take_if(|(segment, _)| segment.id == segment_id)
            .map(|(_, handle)| handle)
    }

    /// Resets per-segment state after the session moved to another segment.
    pub fn on_transition(&mut self) {
        self.triggered_for = None;
        self.pending = None;
        if let Some((segment, _)) = self.ready.take() {
            debug!(segment_id = %segment.id, "discarding unused preload");
        }
    }
}
