//! Timeline segment resolution and playback session engine for recorded
//! screen history.
//!
//! A [`SegmentIndex`] holds the recorder's segments in time order,
//! [`resolve`] maps a timeline point onto a video file and offset, and
//! [`PlaybackSession`] drives a single media output through scrubbing,
//! jumps, preloading and frozen-frame fallback.

pub mod cache;
pub mod config;
pub mod error;
pub mod frozen;
pub mod index;
pub mod jobs;
pub mod media;
pub mod preload;
pub mod resolver;
pub mod runtime;
pub mod segment;
pub mod session;
pub mod store;
pub mod time;
pub mod timer;
pub mod worker;

pub use cache::StillFrameCache;
pub use config::{EngineConfig, load_config, load_config_or_default};
pub use error::{EngineError, MediaError, PlaybackErrorKind, Result};
pub use frozen::{FrozenFrame, FrozenFrameCache};
pub use index::SegmentIndex;
pub use jobs::{Job, JobDispatcher, JobOutcome, RequestId};
pub use media::{
    FfmpegMediaBackend, HeadlessOutput, MediaBackend, MediaHandle, MediaOutput, StillFrame,
};
pub use preload::PreloadScheduler;
pub use resolver::{Resolved, resolve};
pub use runtime::{SessionHandle, SessionRuntime, spawn_session};
pub use segment::{Segment, SegmentId};
pub use session::{Command, Event, PlaybackSession, PlaybackState, SessionMessage, SessionSnapshot};
pub use store::{SegmentStore, SqliteSegmentStore, StoreStats};
pub use time::{AbsoluteTime, Direction, VideoOffset};
pub use worker::WorkerPool;
