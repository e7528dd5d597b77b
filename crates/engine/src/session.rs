use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::StillFrameCache;
use crate::config::{EngineConfig, PlaybackConfig};
use crate::error::{MediaError, PlaybackErrorKind};
use crate::frozen::{Capture, FrozenFrame, FrozenFrameCache};
use crate::index::SegmentIndex;
use crate::jobs::{Job, JobDispatcher, JobOutcome, RequestId, RequestIds};
use crate::media::{MediaHandle, MediaOutput};
use crate::preload::PreloadScheduler;
use crate::resolver::{Resolved, resolve};
use crate::segment::{Segment, SegmentId};
use crate::time::{AbsoluteTime, Direction, VideoOffset, clamp_time};
use crate::timer::DebounceSlot;

/// Commands accepted from the UI or a navigation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    TogglePlayPause,
    /// Continuous drag or scroll input. Always paused.
    Scrub {
        to: AbsoluteTime,
    },
    /// Jump to a time and play once the media is ready.
    Update {
        to: AbsoluteTime,
    },
    /// Debounced [`Command::Update`]; bursts coalesce into the last request.
    ScheduleUpdate {
        to: AbsoluteTime,
    },
}

/// Everything delivered into the serialized session context.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    Command(Command),
    /// Playback position reported by the media output for `segment_id`.
    Progress {
        segment_id: SegmentId,
        offset: VideoOffset,
    },
    Job(JobOutcome),
    RefreshIndex,
    Shutdown,
}

impl From<Command> for SessionMessage {
    fn from(value: Command) -> Self {
        Self::Command(value)
    }
}

impl From<JobOutcome> for SessionMessage {
    fn from(value: JobOutcome) -> Self {
        Self::Job(value)
    }
}

/// Coarse session state, derived from the individual flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    /// No segment loaded.
    Idle,
    /// A media swap is in flight.
    Loading,
    /// Media available, playing or paused.
    Ready,
    /// User-driven positioning; always paused.
    Scrubbing,
    /// The last load failed; the frozen frame is shown.
    Error,
}

/// Observable changes emitted by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    TimeChanged { time: AbsoluteTime },
    SegmentChanged { segment_id: Option<SegmentId> },
    PlayStateChanged { playing: bool },
    StateChanged(PlaybackState),
    FrozenFrameReady(FrozenFrame),
    FrozenFrameVisibility { visible: bool },
    PlaybackError(Option<PlaybackErrorKind>),
    PreloadReady { segment_id: SegmentId },
    IndexRefreshed { segments: usize },
}

/// Point-in-time copy of the observable session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_time: AbsoluteTime,
    pub current_segment: Option<Segment>,
    pub is_playing: bool,
    pub is_scrubbing: bool,
    pub at_start_boundary: bool,
    pub show_frozen_frame: bool,
    pub frozen_frame: Option<FrozenFrame>,
    pub consecutive_failures: u32,
    pub playback_error: Option<PlaybackErrorKind>,
    pub preloaded_segment: Option<SegmentId>,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    request: RequestId,
    segment: Segment,
    offset: VideoOffset,
    autoplay: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Observed {
    time: AbsoluteTime,
    segment_id: Option<SegmentId>,
    playing: bool,
    show_frozen_frame: bool,
    state: PlaybackState,
    error: Option<PlaybackErrorKind>,
}

/// The playback state machine.
///
/// Owns the single live [`MediaOutput`] and every piece of mutable playback
/// state. All mutation happens through [`PlaybackSession::handle`] and the
/// timer and output polling entry points, which the runtime calls from one
/// thread; background work goes out through the [`JobDispatcher`] and comes
/// back as [`SessionMessage::Job`].
pub struct PlaybackSession<O, D> {
    settings: PlaybackConfig,
    index: SegmentIndex,
    output: O,
    dispatcher: D,
    ids: RequestIds,
    frozen: FrozenFrameCache,
    preload: PreloadScheduler,
    scrub_end: DebounceSlot<()>,
    pending_update: DebounceSlot<AbsoluteTime>,
    pending_load: Option<PendingLoad>,
    current_segment: Option<Segment>,
    current_time: AbsoluteTime,
    is_playing: bool,
    is_scrubbing: bool,
    at_start_boundary: bool,
    show_frozen_frame: bool,
    media_ready: bool,
    consecutive_failures: u32,
    last_error: Option<PlaybackErrorKind>,
    events: Vec<Event>,
}

impl<O, D> PlaybackSession<O, D>
where
    O: MediaOutput,
    D: JobDispatcher,
{
    pub fn new(config: &EngineConfig, index: SegmentIndex, output: O, dispatcher: D) -> Self {
        let settings = config.playback.clone();
        Self {
            frozen: FrozenFrameCache::new(StillFrameCache::new(
                config.frames.cache_capacity,
                config.frames.bucket_ms,
            )),
            preload: PreloadScheduler::new(settings.preload_threshold, settings.preload_timeout()),
            scrub_end: DebounceSlot::new(settings.scrub_end_delay()),
            pending_update: DebounceSlot::new(settings.update_debounce()),
            current_time: index.first().map(|first| first.start_ts).unwrap_or(0.0),
            settings,
            index,
            output,
            dispatcher,
            ids: RequestIds::default(),
            pending_load: None,
            current_segment: None,
            is_playing: false,
            is_scrubbing: false,
            at_start_boundary: false,
            show_frozen_frame: false,
            media_ready: false,
            consecutive_failures: 0,
            last_error: None,
            events: Vec::new(),
        }
    }

    /// Applies one message and returns the resulting events.
    pub fn handle(&mut self, message: SessionMessage, now: Instant) -> Vec<Event> {
        let before = self.observe();
        match message {
            SessionMessage::Command(command) => self.apply_command(command, now),
            SessionMessage::Progress { segment_id, offset } => {
                self.on_progress(&segment_id, offset, now)
            }
            SessionMessage::Job(outcome) => self.on_job(outcome, now),
            SessionMessage::RefreshIndex => {
                let segments = self.index.refresh();
                self.frozen.retain_segments(&self.index.snapshot());
                self.events.push(Event::IndexRefreshed { segments });
            }
            SessionMessage::Shutdown => {
                self.output.pause();
                self.is_playing = false;
            }
        }
        self.finish(before)
    }

    /// Fires due debounce timers and expires overdue preloads.
    pub fn handle_timers(&mut self, now: Instant) -> Vec<Event> {
        let before = self.observe();
        if let Some(to) = self.pending_update.take_due(now) {
            debug!(to, "debounced update fired");
            self.update_to(to);
        }
        if self.scrub_end.take_due(now).is_some() {
            self.end_scrub();
        }
        self.preload.expire(now);
        self.finish(before)
    }

    /// Samples the output position as a progress tick.
    pub fn poll_output(&mut self, now: Instant) -> Vec<Event> {
        let before = self.observe();
        let loaded = self.output.loaded_segment().cloned();
        if let (Some(segment_id), Some(offset)) = (loaded, self.output.position()) {
            self.on_progress(&segment_id, offset, now);
        }
        self.finish(before)
    }

    /// Earliest instant at which [`PlaybackSession::handle_timers`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.pending_update.deadline(),
            self.scrub_end.deadline(),
            self.preload.pending_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn play(&mut self, now: Instant) -> Vec<Event> {
        self.handle(Command::Play.into(), now)
    }

    pub fn pause(&mut self, now: Instant) -> Vec<Event> {
        self.handle(Command::Pause.into(), now)
    }

    pub fn toggle_play_pause(&mut self, now: Instant) -> Vec<Event> {
        self.handle(Command::TogglePlayPause.into(), now)
    }

    pub fn scrub(&mut self, to: AbsoluteTime, now: Instant) -> Vec<Event> {
        self.handle(Command::Scrub { to }.into(), now)
    }

    pub fn update(&mut self, to: AbsoluteTime, now: Instant) -> Vec<Event> {
        self.handle(Command::Update { to }.into(), now)
    }

    pub fn schedule_update(&mut self, to: AbsoluteTime, now: Instant) -> Vec<Event> {
        self.handle(Command::ScheduleUpdate { to }.into(), now)
    }

    pub fn state(&self) -> PlaybackState {
        if self.current_segment.is_none() {
            PlaybackState::Idle
        } else if self.pending_load.is_some() {
            PlaybackState::Loading
        } else if !self.media_ready {
            PlaybackState::Error
        } else if self.is_scrubbing {
            PlaybackState::Scrubbing
        } else {
            PlaybackState::Ready
        }
    }

    pub fn current_time(&self) -> AbsoluteTime {
        self.current_time
    }

    pub fn current_segment(&self) -> Option<&Segment> {
        self.current_segment.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_scrubbing(&self) -> bool {
        self.is_scrubbing
    }

    pub fn show_frozen_frame(&self) -> bool {
        self.show_frozen_frame
    }

    pub fn frozen_frame(&self) -> Option<&FrozenFrame> {
        self.frozen.current()
    }

    pub fn playback_error(&self) -> Option<&PlaybackErrorKind> {
        self.last_error.as_ref()
    }

    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            current_time: self.current_time,
            current_segment: self.current_segment.clone(),
            is_playing: self.is_playing,
            is_scrubbing: self.is_scrubbing,
            at_start_boundary: self.at_start_boundary,
            show_frozen_frame: self.show_frozen_frame,
            frozen_frame: self.frozen.current().cloned(),
            consecutive_failures: self.consecutive_failures,
            playback_error: self.last_error.clone(),
            preloaded_segment: self.preload.ready_segment().map(|segment| segment.id.clone()),
        }
    }

    fn apply_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Play => self.set_playing(true),
            Command::Pause => self.set_playing(false),
            Command::TogglePlayPause => self.set_playing(!self.is_playing),
            Command::Scrub { to } => self.scrub_to(to, now),
            Command::Update { to } => self.update_to(to),
            Command::ScheduleUpdate { to } => self.pending_update.arm(now, to),
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if playing == self.is_playing {
            return;
        }
        if playing && self.current_segment.is_none() {
            debug!("play ignored, nothing loaded");
            return;
        }
        if playing && !self.media_ready && self.pending_load.is_none() {
            debug!("play ignored, media unavailable");
            return;
        }

        self.is_playing = playing;
        if let Some(pending) = &mut self.pending_load {
            pending.autoplay = playing;
        }
        if !self.media_ready {
            return;
        }
        if playing {
            self.output.play();
            self.reveal_live_video();
        } else {
            self.output.pause();
        }
    }

    fn scrub_to(&mut self, to: AbsoluteTime, now: Instant) {
        let segments = self.index.snapshot();
        let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
            debug!(to, "scrub ignored, no segments indexed");
            return;
        };

        self.is_scrubbing = true;
        self.scrub_end.cancel();
        self.pending_update.cancel();

        let mut target = clamp_time(to, first.start_ts, last.end_ts);
        self.at_start_boundary =
            (target - first.start_ts).abs() <= self.settings.start_boundary_epsilon_secs;
        if self.at_start_boundary {
            self.show_frozen_frame = true;
            if self.frozen.current().is_none() && !self.frozen.is_capturing() {
                let source = self.current_segment.clone().unwrap_or_else(|| first.clone());
                self.capture_frozen(&source, target);
            }
        }

        let stuck = self.current_segment.as_ref().and_then(|current| {
            let radius = self.settings.stick_radius_secs;
            let edge = if target > current.end_ts && target - current.end_ts <= radius {
                current.end_ts
            } else if target < current.start_ts && current.start_ts - target <= radius {
                current.start_ts
            } else {
                return None;
            };
            Some(Resolved {
                offset: current.video_offset(edge),
                segment: current.clone(),
                clamped_time: edge,
            })
        });

        let resolved = match stuck {
            Some(resolved) => {
                debug!(to, edge = resolved.clamped_time, "scrub stuck to segment edge");
                target = resolved.clamped_time;
                resolved
            }
            None => {
                let direction = Direction::from_delta(target - self.current_time);
                let Some(resolved) = resolve(&segments, target, direction) else {
                    debug!(to, "scrub target did not resolve");
                    return;
                };
                resolved
            }
        };
        debug!(
            to,
            target,
            segment_id = %resolved.segment.id,
            offset = resolved.offset,
            "scrub resolved"
        );

        let previous_time = std::mem::replace(&mut self.current_time, target);
        self.swap(resolved, true, previous_time);
        self.scrub_end.arm(now, ());
    }

    fn update_to(&mut self, to: AbsoluteTime) {
        let segments = self.index.snapshot();
        let Some(resolved) = resolve(&segments, to, Direction::Still) else {
            debug!(to, "update ignored, no segments indexed");
            return;
        };
        info!(
            to,
            segment_id = %resolved.segment.id,
            offset = resolved.offset,
            "jumping to time"
        );

        self.at_start_boundary = false;
        let previous_time = std::mem::replace(&mut self.current_time, resolved.clamped_time);
        self.swap(resolved, false, previous_time);
    }

    fn end_scrub(&mut self) {
        self.is_scrubbing = false;
        let loaded = self.media_ready && self.pending_load.is_none();
        if !self.at_start_boundary && loaded {
            self.show_frozen_frame = false;
        }
        debug!(at_start_boundary = self.at_start_boundary, "scrub ended");
    }

    /// Moves the live output to `resolved`, loading a new source when needed.
    fn swap(&mut self, resolved: Resolved, is_scrub: bool, previous_time: AbsoluteTime) {
        let autoplay = !is_scrub;
        if is_scrub {
            self.is_playing = false;
            self.output.pause();
        }

        let Resolved {
            segment: target,
            offset,
            ..
        } = resolved;
        let same_segment = self
            .current_segment
            .as_ref()
            .is_some_and(|current| current.id == target.id);

        if same_segment {
            if let Some(pending) = &mut self.pending_load {
                pending.offset = offset;
                pending.autoplay = autoplay;
                return;
            }
            if self.media_ready {
                self.seek_loaded(&target, offset, autoplay);
                return;
            }
            debug!(segment_id = %target.id, "retrying load of current segment");
            self.capture_frozen(&target, previous_time);
            self.begin_load(target, offset, autoplay);
            return;
        }

        info!(
            from = ?self.current_segment.as_ref().map(|segment| &segment.id),
            to = %target.id,
            "switching segment"
        );
        let adopted = self.preload.take_ready(&target.id);
        self.preload.on_transition();
        let outgoing = self.current_segment.replace(target.clone());

        match outgoing {
            Some(outgoing) => self.capture_frozen(&outgoing, previous_time),
            None => self.capture_frozen(&target, target.absolute_time(offset)),
        }
        match adopted {
            Some(handle) => {
                info!(segment_id = %target.id, "adopting preloaded segment");
                self.pending_load = None;
                self.install(target, handle, offset, autoplay);
            }
            None => self.begin_load(target, offset, autoplay),
        }
    }

    fn begin_load(&mut self, segment: Segment, offset: VideoOffset, autoplay: bool) {
        let request = self.ids.next_id();
        debug!(segment_id = %segment.id, request = request.0, offset, "loading segment");
        self.media_ready = false;
        self.show_frozen_frame = true;
        self.output.pause();
        self.dispatcher.dispatch(Job::LoadMedia {
            request,
            segment: segment.clone(),
        });
        self.pending_load = Some(PendingLoad {
            request,
            segment,
            offset,
            autoplay,
        });
    }

    fn install(
        &mut self,
        segment: Segment,
        handle: MediaHandle,
        offset: VideoOffset,
        autoplay: bool,
    ) {
        let installed = self
            .output
            .replace_source(&segment, handle)
            .and_then(|()| self.output.seek(offset));
        match installed {
            Ok(()) => self.on_media_ready(autoplay),
            Err(error) => self.on_media_failure(&segment, error),
        }
    }

    fn seek_loaded(&mut self, segment: &Segment, offset: VideoOffset, autoplay: bool) {
        match self.output.seek(offset) {
            Ok(()) => {
                if autoplay {
                    self.is_playing = true;
                    self.output.play();
                    self.reveal_live_video();
                }
            }
            Err(error) => self.on_media_failure(segment, error),
        }
    }

    fn on_media_ready(&mut self, autoplay: bool) {
        self.media_ready = true;
        self.consecutive_failures = 0;
        self.last_error = None;
        if autoplay {
            self.is_playing = true;
        }
        if self.is_playing {
            self.output.play();
            self.reveal_live_video();
        } else {
            self.output.pause();
            if !self.is_scrubbing && !self.at_start_boundary {
                self.show_frozen_frame = false;
            }
        }
    }

    /// Hides the still once live video is actually playing.
    fn reveal_live_video(&mut self) {
        if self.media_ready && !self.is_scrubbing && self.pending_load.is_none() {
            self.at_start_boundary = false;
            self.show_frozen_frame = false;
        }
    }

    fn on_media_failure(&mut self, segment: &Segment, error: MediaError) {
        self.consecutive_failures += 1;
        let kind = PlaybackErrorKind::classify(
            &error,
            self.consecutive_failures,
            self.settings.failure_threshold,
        );
        warn!(
            segment_id = %segment.id,
            %error,
            consecutive_failures = self.consecutive_failures,
            kind = %kind,
            "segment playback failed"
        );
        self.output.clear_source();
        self.media_ready = false;
        self.is_playing = false;
        self.show_frozen_frame = true;
        self.last_error = Some(kind);
    }

    fn on_progress(&mut self, segment_id: &str, offset: VideoOffset, now: Instant) {
        if self.is_scrubbing || !self.media_ready || self.pending_load.is_some() {
            return;
        }
        let Some(current) = self.current_segment.clone() else {
            return;
        };
        if current.id != segment_id {
            debug!(segment_id, current = %current.id, "dropping progress for stale segment");
            return;
        }

        self.current_time = current.absolute_time(offset);
        let next = self.index.next_after(&current.id);
        if let Some(job) =
            self.preload
                .on_progress(&current, offset, next.as_ref(), &mut self.ids, now)
        {
            self.dispatcher.dispatch(job);
        }

        let Some(video_duration) = current.video_duration() else {
            return;
        };
        if !self.is_playing || offset < video_duration - self.settings.end_of_segment_tolerance_secs
        {
            return;
        }
        match next {
            Some(next) => {
                let previous_time = std::mem::replace(&mut self.current_time, next.start_ts);
                self.swap(
                    Resolved {
                        offset: 0.0,
                        clamped_time: next.start_ts,
                        segment: next,
                    },
                    false,
                    previous_time,
                );
            }
            None => {
                info!(segment_id = %current.id, "reached end of recordings");
                self.set_playing(false);
            }
        }
    }

    fn on_job(&mut self, outcome: JobOutcome, now: Instant) {
        match outcome {
            JobOutcome::MediaLoaded {
                request,
                segment_id,
                result,
            } => {
                let Some(pending) = self
                    .pending_load
                    .take_if(|pending| pending.request == request)
                else {
                    debug!(%segment_id, request = request.0, "dropping stale load result");
                    return;
                };
                match result {
                    Ok(handle) => {
                        info!(segment_id = %pending.segment.id, "segment loaded");
                        self.install(pending.segment, handle, pending.offset, pending.autoplay);
                    }
                    Err(error) => self.on_media_failure(&pending.segment, error),
                }
            }
            JobOutcome::Preloaded {
                request,
                segment_id,
                result,
            } => {
                let upcoming = self
                    .current_segment
                    .as_ref()
                    .and_then(|current| self.index.next_after(&current.id));
                let upcoming = upcoming.as_ref().map(|segment| segment.id.as_str());
                if self.preload.on_result(request, result, upcoming, now) {
                    self.events.push(Event::PreloadReady { segment_id });
                }
            }
            JobOutcome::StillCaptured {
                request,
                segment_id,
                path,
                offset,
                result,
            } => {
                let published = self
                    .frozen
                    .complete(request, segment_id, &path, offset, result);
                if let Some(frame) = published {
                    self.events.push(Event::FrozenFrameReady(frame));
                }
            }
        }
    }

    fn capture_frozen(&mut self, segment: &Segment, at: AbsoluteTime) {
        match self.frozen.capture(segment, at, &mut self.ids) {
            Capture::Published(frame) => self.events.push(Event::FrozenFrameReady(frame)),
            Capture::Dispatch(job) => self.dispatcher.dispatch(job),
        }
    }

    fn observe(&self) -> Observed {
        Observed {
            time: self.current_time,
            segment_id: self.current_segment.as_ref().map(|segment| segment.id.clone()),
            playing: self.is_playing,
            show_frozen_frame: self.show_frozen_frame,
            state: self.state(),
            error: self.last_error.clone(),
        }
    }

    fn finish(&mut self, before: Observed) -> Vec<Event> {
        let after = self.observe();
        let mut events = Vec::new();
        if after.segment_id != before.segment_id {
            events.push(Event::SegmentChanged {
                segment_id: after.segment_id.clone(),
            });
        }
        if after.time != before.time {
            events.push(Event::TimeChanged { time: after.time });
        }
        if after.state != before.state {
            events.push(Event::StateChanged(after.state));
        }
        if after.playing != before.playing {
            events.push(Event::PlayStateChanged {
                playing: after.playing,
            });
        }
        if after.show_frozen_frame != before.show_frozen_frame {
            events.push(Event::FrozenFrameVisibility {
                visible: after.show_frozen_frame,
            });
        }
        if after.error != before.error {
            events.push(Event::PlaybackError(after.error));
        }
        events.append(&mut self.events);
        events
    }
}
