use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::cache::StillFrameCache;
use crate::error::MediaError;
use crate::jobs::{Job, RequestId, RequestIds};
use crate::media::StillFrame;
use crate::segment::{Segment, SegmentId};
use crate::time::{AbsoluteTime, VideoOffset};

/// Still image shown in place of live video.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenFrame {
    pub segment_id: SegmentId,
    pub at: AbsoluteTime,
    pub frame: StillFrame,
}

/// What a capture request turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// Served from the still cache and already published.
    Published(FrozenFrame),
    /// Needs a background decode.
    Dispatch(Job),
}

#[derive(Debug, Clone)]
struct PendingCapture {
    request: RequestId,
    at: AbsoluteTime,
}

/// Fallback still frame plus the decoded stills it was built from.
///
/// Only the most recent capture may publish; a failed capture leaves the
/// previous frame in place.
#[derive(Debug)]
pub struct FrozenFrameCache {
    stills: StillFrameCache,
    current: Option<FrozenFrame>,
    pending: Option<PendingCapture>,
}

impl FrozenFrameCache {
    pub fn new(stills: StillFrameCache) -> Self {
        Self {
            stills,
            current: None,
            pending: None,
        }
    }

    pub fn current(&self) -> Option<&FrozenFrame> {
        self.current.as_ref()
    }

    pub fn is_capturing(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts capturing `segment` at absolute time `at`.
    pub fn capture(
        &mut self,
        segment: &Segment,
        at: AbsoluteTime,
        ids: &mut RequestIds,
    ) -> Capture {
        let offset = segment.video_offset(at);
        if let Some(frame) = self.stills.get(&segment.video_path, offset) {
            debug!(segment_id = %segment.id, offset, "still cache hit");
            self.pending = None;
            let frozen = FrozenFrame {
                segment_id: segment.id.clone(),
                at,
                frame,
            };
            self.current = Some(frozen.clone());
            return Capture::Published(frozen);
        }

        debug!(segment_id = %segment.id, offset, "still cache miss");
        let request = ids.next_id();
        self.pending = Some(PendingCapture { request, at });
        Capture::Dispatch(Job::CaptureStill {
            request,
            segment_id: segment.id.clone(),
            path: segment.video_path.clone(),
            offset,
        })
    }

    /// Forgets cached stills of files that are no longer indexed.
    ///
    /// The published frame stays visible until a newer capture replaces it.
    pub fn retain_segments(&mut self, segments: &[Segment]) -> usize {
        let indexed: HashSet<&Path> = segments
            .iter()
            .map(|segment| segment.video_path.as_path())
            .collect();
        self.stills.retain_paths(|path| indexed.contains(path))
    }

    /// Applies a decode result. Returns the frame when it was published.
    pub fn complete(
        &mut self,
        request: RequestId,
        segment_id: SegmentId,
        path: &Path,
        offset: VideoOffset,
        result: Result<StillFrame, MediaError>,
    ) -> Option<FrozenFrame> {
        let frame = match result {
            Ok(frame) => frame,
            Err(error) => {
                if self.pending.as_ref().is_some_and(|pending| pending.request == request) {
                    self.pending = None;
                }
                warn!(%segment_id, %error, "still capture failed, keeping previous frame");
                return None;
            }
        };
        self.stills.insert(path, offset, frame.clone());

        let Some(pending) = self.pending.take_if(|pending| pending.request == request) else {
            debug!(%segment_id, request = request.0, "dropping superseded still");
            return None;
        };
        let frozen = FrozenFrame {
            segment_id,
            at: pending.at,
            frame,
        };
        self.current = Some(frozen.clone());
        Some(frozen)
    }
}
