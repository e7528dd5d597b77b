use std::path::PathBuf;

use tracing::debug;

use crate::error::MediaError;
use crate::media::{MediaBackend, MediaHandle, StillFrame};
use crate::segment::{Segment, SegmentId};
use crate::time::VideoOffset;

/// Identity of one background request, used to drop superseded results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Monotonic [`RequestId`] allocator.
#[derive(Debug, Default)]
pub struct RequestIds {
    next: u64,
}

impl RequestIds {
    pub fn next_id(&mut self) -> RequestId {
        self.next += 1;
        RequestId(self.next)
    }
}

/// Background work requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    LoadMedia {
        request: RequestId,
        segment: Segment,
    },
    Preload {
        request: RequestId,
        segment: Segment,
    },
    CaptureStill {
        request: RequestId,
        segment_id: SegmentId,
        path: PathBuf,
        offset: VideoOffset,
    },
}

impl Job {
    pub fn request(&self) -> RequestId {
        match self {
            Self::LoadMedia { request, .. }
            | Self::Preload { request, .. }
            | Self::CaptureStill { request, .. } => *request,
        }
    }
}

/// Result of a [`Job`], tagged with the identity it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    MediaLoaded {
        request: RequestId,
        segment_id: SegmentId,
        result: Result<MediaHandle, MediaError>,
    },
    Preloaded {
        request: RequestId,
        segment_id: SegmentId,
        result: Result<MediaHandle, MediaError>,
    },
    StillCaptured {
        request: RequestId,
        segment_id: SegmentId,
        path: PathBuf,
        offset: VideoOffset,
        result: Result<StillFrame, MediaError>,
    },
}

/// Sink for background jobs; results come back as [`JobOutcome`]s.
pub trait JobDispatcher {
    fn dispatch(&mut self, job: Job);
}

/// Executes one job against `backend`.
pub fn run_job(backend: &dyn MediaBackend, job: Job) -> JobOutcome {
    debug!(?job, "running job");
    match job {
        Job::LoadMedia { request, segment } => JobOutcome::MediaLoaded {
            request,
            result: backend.open(&segment.video_path),
            segment_id: segment.id,
        },
        Job::Preload { request, segment } => JobOutcome::Preloaded {
            request,
            result: backend.open(&segment.video_path),
            segment_id: segment.id,
        },
        Job::CaptureStill {
            request,
            segment_id,
            path,
            offset,
        } => JobOutcome::StillCaptured {
            request,
            segment_id,
            result: backend.decode_still(&path, offset),
            path,
            offset,
        },
    }
}
