use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use playback_engine::{
    EngineConfig, Event, Job, JobDispatcher, JobOutcome, MediaError, MediaHandle, MediaOutput,
    PlaybackErrorKind, PlaybackSession, PlaybackState, RequestId, Segment, SegmentId,
    SegmentIndex, SegmentStore, SessionMessage, StillFrame,
};

#[test]
fn empty_index_makes_scrub_and_update_no_ops() {
    let mut fixture = Fixture::new(Vec::new());
    let now = Instant::now();

    let mut events = fixture.session.scrub(1_000.0, now);
    events.extend(fixture.session.update(1_000.0, now));
    events.extend(fixture.session.handle_timers(now + Duration::from_secs(1)));

    assert!(events.is_empty());
    assert!(fixture.session.current_segment().is_none());
    assert_eq!(fixture.session.state(), PlaybackState::Idle);
    assert!(fixture.jobs().is_empty());
}

#[test]
fn scrubbing_just_past_the_end_sticks_and_further_crosses_the_gap() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_050.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.scrub(1_100.3, now + ms(10));
    assert_eq!(fixture.session.current_time(), 1_100.0);
    assert_eq!(current_id(&fixture), Some("a"));
    assert_eq!(fixture.output_log().seeks.last().copied(), Some(10.0));

    fixture.session.scrub(1_100.6, now + ms(20));
    assert_eq!(current_id(&fixture), Some("b"));
    assert_eq!(fixture.session.current_time(), 1_100.6);
    let load = fixture.last_load().expect("load for b dispatched");
    assert_eq!(load.1.id, "b");
}

#[test]
fn scheduled_updates_coalesce_into_the_last_request() {
    let mut fixture = Fixture::new(three_segments());
    let start = Instant::now();

    fixture.session.schedule_update(1_010.0, start);
    fixture.session.schedule_update(1_020.0, start + ms(50));
    fixture.session.schedule_update(1_250.0, start + ms(100));

    assert_eq!(fixture.session.next_deadline(), Some(start + ms(300)));
    assert!(fixture.session.handle_timers(start + ms(250)).is_empty());
    assert!(fixture.jobs().is_empty());

    fixture.session.handle_timers(start + ms(300));

    let loads: Vec<String> = fixture
        .jobs()
        .into_iter()
        .filter_map(|job| match job {
            Job::LoadMedia { segment, .. } => Some(segment.id),
            _ => None,
        })
        .collect();
    assert_eq!(loads, vec!["b".to_string()]);
    assert_eq!(fixture.session.current_time(), 1_250.0);
    assert!(fixture.session.next_deadline().is_none());
}

#[test]
fn preloaded_next_segment_is_adopted_without_a_second_load() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_000.0, now);
    fixture.complete_load(now, Ok(()));
    assert!(fixture.session.is_playing());

    fixture.session.handle(progress("a", 7.0), now + ms(100));
    assert_eq!(fixture.count_jobs(|job| matches!(job, Job::Preload { .. })), 0);

    fixture.session.handle(progress("a", 8.0), now + ms(200));
    let (request, segment) = fixture
        .jobs()
        .into_iter()
        .find_map(|job| match job {
            Job::Preload { request, segment } => Some((request, segment)),
            _ => None,
        })
        .expect("preload dispatched at threshold");
    assert_eq!(segment.id, "b");

    let events = fixture.session.handle(
        SessionMessage::Job(JobOutcome::Preloaded {
            request,
            segment_id: "b".into(),
            result: Ok(handle_for(&segment)),
        }),
        now + ms(300),
    );
    assert!(events.contains(&Event::PreloadReady {
        segment_id: "b".into()
    }));
    assert_eq!(
        fixture.session.snapshot().preloaded_segment.as_deref(),
        Some("b")
    );

    fixture.session.handle(progress("a", 9.0), now + ms(400));
    let captures_before = fixture.count_jobs(|job| matches!(job, Job::CaptureStill { .. }));
    fixture.session.handle(progress("a", 9.97), now + ms(500));

    assert_eq!(current_id(&fixture), Some("b"));
    let outgoing_capture = fixture.jobs().into_iter().rev().find_map(|job| match job {
        Job::CaptureStill { segment_id, .. } => Some(segment_id),
        _ => None,
    });
    assert_eq!(
        fixture.count_jobs(|job| matches!(job, Job::CaptureStill { .. })),
        captures_before + 1
    );
    assert_eq!(outgoing_capture.as_deref(), Some("a"));
    assert!(!fixture.session.show_frozen_frame());
    assert_eq!(fixture.session.state(), PlaybackState::Ready);
    assert!(fixture.session.is_playing());
    assert_eq!(fixture.count_jobs(|job| matches!(job, Job::Preload { .. })), 1);
    let loaded: Vec<String> = fixture
        .jobs()
        .into_iter()
        .filter_map(|job| match job {
            Job::LoadMedia { segment, .. } => Some(segment.id),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec!["a".to_string()]);
    assert_eq!(fixture.output_log().sources, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn three_consecutive_load_failures_escalate() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    let missing = MediaError::FileMissing(PathBuf::from("chunks/a.mp4"));

    fixture.session.update(1_050.0, now);
    fixture.complete_load(now, Err(missing.clone()));
    assert_eq!(
        fixture.session.playback_error(),
        Some(&PlaybackErrorKind::VideoFileMissing(PathBuf::from("chunks/a.mp4")))
    );

    fixture.session.update(1_050.0, now + ms(10));
    fixture.complete_load(now + ms(10), Err(missing.clone()));
    fixture.session.update(1_050.0, now + ms(20));
    let events = fixture.complete_load(now + ms(20), Err(missing));

    assert_eq!(
        fixture.session.playback_error(),
        Some(&PlaybackErrorKind::RepeatedFailures(3))
    );
    assert!(events.contains(&Event::PlaybackError(Some(
        PlaybackErrorKind::RepeatedFailures(3)
    ))));
    assert_eq!(fixture.session.state(), PlaybackState::Error);
    assert!(fixture.session.show_frozen_frame());
    assert!(!fixture.session.is_playing());

    fixture.session.update(1_050.0, now + ms(30));
    fixture.complete_load(now + ms(30), Ok(()));
    assert_eq!(fixture.session.playback_error(), None);
    assert_eq!(fixture.session.snapshot().consecutive_failures, 0);
}

#[test]
fn progress_ticks_do_not_move_time_while_scrubbing() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_050.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.scrub(1_060.0, now + ms(10));
    assert_eq!(fixture.session.state(), PlaybackState::Scrubbing);
    assert!(!fixture.session.is_playing());

    fixture.session.handle(progress("a", 2.0), now + ms(20));
    assert_eq!(fixture.session.current_time(), 1_060.0);

    fixture.session.handle_timers(now + ms(310));
    assert!(!fixture.session.is_scrubbing());
    fixture.session.handle(progress("a", 2.0), now + ms(320));
    assert_eq!(fixture.session.current_time(), 1_020.0);
}

#[test]
fn frozen_frame_covers_a_scrubbed_swap_until_the_scrub_ends() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_050.0, now);
    fixture.complete_load(now, Ok(()));
    assert!(!fixture.session.show_frozen_frame());

    fixture.session.scrub(1_250.0, now + ms(10));
    assert!(fixture.session.show_frozen_frame());
    let capture = fixture
        .jobs()
        .into_iter()
        .rev()
        .find_map(|job| match job {
            Job::CaptureStill {
                request,
                segment_id,
                path,
                offset,
            } => Some((request, segment_id, path, offset)),
            _ => None,
        })
        .expect("outgoing segment captured");
    assert_eq!(capture.1, "a");

    let events = fixture.session.handle(
        SessionMessage::Job(JobOutcome::StillCaptured {
            request: capture.0,
            segment_id: capture.1,
            path: capture.2,
            offset: capture.3,
            result: Ok(still()),
        }),
        now + ms(20),
    );
    assert!(events.iter().any(|event| matches!(event, Event::FrozenFrameReady(_))));

    fixture.complete_load(now + ms(30), Ok(()));
    assert!(fixture.session.show_frozen_frame());

    let events = fixture.session.handle_timers(now + ms(310));
    assert!(events.contains(&Event::FrozenFrameVisibility { visible: false }));
    assert_eq!(fixture.session.state(), PlaybackState::Ready);
    assert!(!fixture.session.is_playing());
}

#[test]
fn start_boundary_keeps_frozen_frame_after_scrub_ends() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();

    fixture.session.scrub(900.0, now);
    assert_eq!(fixture.session.current_time(), 1_000.0);
    assert!(fixture.session.snapshot().at_start_boundary);
    fixture.complete_load(now + ms(10), Ok(()));

    fixture.session.handle_timers(now + ms(300));

    assert!(!fixture.session.is_scrubbing());
    assert!(fixture.session.show_frozen_frame());
}

#[test]
fn superseded_load_result_is_dropped() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_050.0, now);
    let (first_request, _) = fixture.last_load().expect("first load");
    fixture.session.update(1_250.0, now + ms(10));

    fixture.session.handle(
        SessionMessage::Job(JobOutcome::MediaLoaded {
            request: first_request,
            segment_id: "a".into(),
            result: Ok(handle_for(&three_segments()[0])),
        }),
        now + ms(20),
    );
    assert_eq!(fixture.session.state(), PlaybackState::Loading);
    assert!(fixture.output_log().sources.is_empty());

    fixture.complete_load(now + ms(30), Ok(()));
    assert_eq!(fixture.session.state(), PlaybackState::Ready);
    assert_eq!(fixture.output_log().sources, vec!["b".to_string()]);
}

#[test]
fn play_and_pause_are_idempotent() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.scrub(1_050.0, now);
    fixture.complete_load(now, Ok(()));
    fixture.session.handle_timers(now + ms(300));
    assert!(!fixture.session.is_playing());

    let first = fixture.session.play(now + ms(400));
    let second = fixture.session.play(now + ms(410));
    assert_eq!(first, vec![Event::PlayStateChanged { playing: true }]);
    assert!(second.is_empty());
    assert!(fixture.output_log().playing);

    fixture.session.toggle_play_pause(now + ms(420));
    assert!(!fixture.session.is_playing());
    assert!(fixture.session.pause(now + ms(430)).is_empty());
    assert!(!fixture.output_log().playing);
}

#[test]
fn playback_pauses_at_the_end_of_the_last_segment() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_490.0, now);
    fixture.complete_load(now, Ok(()));
    assert!(fixture.session.is_playing());

    fixture.session.handle(progress("c", 10.0), now + ms(100));

    assert!(!fixture.session.is_playing());
    assert_eq!(current_id(&fixture), Some("c"));
    assert_eq!(fixture.session.current_time(), 1_500.0);
}

#[test]
fn jump_after_start_boundary_scrub_reveals_live_video() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.scrub(900.0, now);
    fixture.complete_load(now + ms(10), Ok(()));
    fixture.session.handle_timers(now + ms(300));
    assert!(fixture.session.show_frozen_frame());

    let events = fixture.session.update(1_050.0, now + ms(400));

    assert!(fixture.session.is_playing());
    assert!(!fixture.session.show_frozen_frame());
    assert!(!fixture.session.snapshot().at_start_boundary);
    assert!(events.contains(&Event::FrozenFrameVisibility { visible: false }));
    assert_eq!(fixture.session.state(), PlaybackState::Ready);
    assert_eq!(fixture.count_jobs(|job| matches!(job, Job::LoadMedia { .. })), 1);
}

#[test]
fn play_after_start_boundary_scrub_reveals_live_video() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.scrub(900.0, now);
    fixture.complete_load(now + ms(10), Ok(()));
    fixture.session.handle_timers(now + ms(300));
    assert!(fixture.session.show_frozen_frame());

    let events = fixture.session.play(now + ms(400));
    fixture.session.handle(progress("a", 5.0), now + ms(500));

    assert!(events.contains(&Event::FrozenFrameVisibility { visible: false }));
    assert!(fixture.session.is_playing());
    assert!(!fixture.session.show_frozen_frame());
    assert_eq!(fixture.session.current_time(), 1_050.0);
}

#[test]
fn scrubbing_cancels_a_scheduled_update() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_050.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.schedule_update(1_250.0, now + ms(10));
    fixture.session.scrub(1_060.0, now + ms(20));
    fixture.session.handle_timers(now + ms(400));

    assert_eq!(current_id(&fixture), Some("a"));
    assert_eq!(fixture.session.current_time(), 1_060.0);
    assert_eq!(fixture.count_jobs(|job| matches!(job, Job::LoadMedia { .. })), 1);
    assert!(fixture.session.next_deadline().is_none());
}

#[test]
fn scrubbing_just_before_the_start_sticks_and_further_crosses_back() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_250.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.scrub(1_199.7, now + ms(10));
    assert_eq!(fixture.session.current_time(), 1_200.0);
    assert_eq!(current_id(&fixture), Some("b"));
    assert_eq!(fixture.output_log().seeks.last().copied(), Some(0.0));

    fixture.session.scrub(1_199.4, now + ms(20));
    assert_eq!(current_id(&fixture), Some("a"));
    assert_eq!(fixture.session.current_time(), 1_199.4);
    let (_, load) = fixture.last_load().expect("load for a dispatched");
    assert_eq!(load.id, "a");
}

#[test]
fn timed_out_preload_falls_back_to_a_normal_load() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_000.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.handle(progress("a", 8.0), now + ms(100));
    let (request, segment) = fixture
        .jobs()
        .into_iter()
        .find_map(|job| match job {
            Job::Preload { request, segment } => Some((request, segment)),
            _ => None,
        })
        .expect("preload dispatched at threshold");

    fixture.session.handle_timers(now + Duration::from_secs(6));
    let events = fixture.session.handle(
        SessionMessage::Job(JobOutcome::Preloaded {
            request,
            segment_id: "b".into(),
            result: Ok(handle_for(&segment)),
        }),
        now + Duration::from_secs(7),
    );
    assert!(!events.iter().any(|event| matches!(event, Event::PreloadReady { .. })));
    assert!(fixture.session.snapshot().preloaded_segment.is_none());

    fixture.session.handle(progress("a", 9.97), now + Duration::from_secs(8));

    assert_eq!(current_id(&fixture), Some("b"));
    assert_eq!(fixture.session.state(), PlaybackState::Loading);
    assert!(fixture.session.show_frozen_frame());
    let (_, load) = fixture.last_load().expect("load for b dispatched");
    assert_eq!(load.id, "b");
    assert_eq!(fixture.count_jobs(|job| matches!(job, Job::Preload { .. })), 1);

    fixture.complete_load(now + Duration::from_secs(9), Ok(()));
    assert_eq!(fixture.session.state(), PlaybackState::Ready);
    assert!(fixture.session.is_playing());
    assert!(!fixture.session.show_frozen_frame());
}

#[test]
fn failed_preload_falls_back_to_a_normal_load() {
    let mut fixture = Fixture::new(three_segments());
    let now = Instant::now();
    fixture.session.update(1_000.0, now);
    fixture.complete_load(now, Ok(()));

    fixture.session.handle(progress("a", 8.0), now + ms(100));
    let request = fixture
        .jobs()
        .into_iter()
        .find_map(|job| match job {
            Job::Preload { request, .. } => Some(request),
            _ => None,
        })
        .expect("preload dispatched at threshold");
    fixture.session.handle(
        SessionMessage::Job(JobOutcome::Preloaded {
            request,
            segment_id: "b".into(),
            result: Err(MediaError::FileMissing(PathBuf::from("chunks/b.mp4"))),
        }),
        now + ms(200),
    );
    assert_eq!(fixture.session.playback_error(), None);

    fixture.session.handle(progress("a", 9.97), now + ms(300));

    assert_eq!(current_id(&fixture), Some("b"));
    let (_, load) = fixture.last_load().expect("load for b dispatched");
    assert_eq!(load.id, "b");
    assert_eq!(fixture.session.state(), PlaybackState::Loading);
}

struct Fixture {
    session: PlaybackSession<ScriptedOutput, RecordingDispatcher>,
    jobs: Arc<Mutex<Vec<Job>>>,
    output: Arc<Mutex<OutputLog>>,
}

impl Fixture {
    fn new(segments: Vec<Segment>) -> Self {
        let index = SegmentIndex::open(Arc::new(FixedStore(segments)));
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let output = Arc::new(Mutex::new(OutputLog::default()));
        let session = PlaybackSession::new(
            &EngineConfig::default(),
            index,
            ScriptedOutput {
                log: Arc::clone(&output),
                loaded: None,
                position: None,
            },
            RecordingDispatcher {
                jobs: Arc::clone(&jobs),
            },
        );
        Self {
            session,
            jobs,
            output,
        }
    }

    fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().expect("lock jobs").clone()
    }

    fn count_jobs(&self, predicate: impl Fn(&Job) -> bool) -> usize {
        self.jobs().iter().filter(|job| predicate(job)).count()
    }

    fn output_log(&self) -> OutputLog {
        self.output.lock().expect("lock output log").clone()
    }

    fn last_load(&self) -> Option<(RequestId, Segment)> {
        self.jobs().into_iter().rev().find_map(|job| match job {
            Job::LoadMedia { request, segment } => Some((request, segment)),
            _ => None,
        })
    }

    /// Answers the most recent load request.
    fn complete_load(&mut self, now: Instant, result: Result<(), MediaError>) -> Vec<Event> {
        let (request, segment) = self.last_load().expect("a load was dispatched");
        let result = result.map(|()| handle_for(&segment));
        self.session.handle(
            SessionMessage::Job(JobOutcome::MediaLoaded {
                request,
                segment_id: segment.id,
                result,
            }),
            now,
        )
    }
}

#[derive(Debug, Clone, Default)]
struct OutputLog {
    sources: Vec<String>,
    seeks: Vec<f64>,
    playing: bool,
}

struct ScriptedOutput {
    log: Arc<Mutex<OutputLog>>,
    loaded: Option<SegmentId>,
    position: Option<f64>,
}

impl MediaOutput for ScriptedOutput {
    fn replace_source(
        &mut self,
        segment: &Segment,
        _handle: MediaHandle,
    ) -> Result<(), MediaError> {
        self.loaded = Some(segment.id.clone());
        self.position = Some(0.0);
        let mut log = self.log.lock().expect("lock output log");
        log.sources.push(segment.id.clone());
        log.playing = false;
        Ok(())
    }

    fn clear_source(&mut self) {
        self.loaded = None;
        self.position = None;
        self.log.lock().expect("lock output log").playing = false;
    }

    fn seek(&mut self, offset: f64) -> Result<(), MediaError> {
        self.position = Some(offset);
        self.log.lock().expect("lock output log").seeks.push(offset);
        Ok(())
    }

    fn play(&mut self) {
        self.log.lock().expect("lock output log").playing = true;
    }

    fn pause(&mut self) {
        self.log.lock().expect("lock output log").playing = false;
    }

    fn loaded_segment(&self) -> Option<&SegmentId> {
        self.loaded.as_ref()
    }

    fn position(&self) -> Option<f64> {
        self.position
    }
}

struct RecordingDispatcher {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl JobDispatcher for RecordingDispatcher {
    fn dispatch(&mut self, job: Job) {
        self.jobs.lock().expect("lock jobs").push(job);
    }
}

struct FixedStore(Vec<Segment>);

impl SegmentStore for FixedStore {
    fn segments(&self) -> playback_engine::Result<Vec<Segment>> {
        Ok(self.0.clone())
    }

    fn segments_between(&self, start: f64, end: f64) -> playback_engine::Result<Vec<Segment>> {
        Ok(self
            .0
            .iter()
            .filter(|segment| segment.end_ts >= start && segment.start_ts <= end)
            .cloned()
            .collect())
    }
}

fn three_segments() -> Vec<Segment> {
    vec![
        segment("a", 1_000.0, 1_100.0),
        segment("b", 1_200.0, 1_300.0),
        segment("c", 1_400.0, 1_500.0),
    ]
}

fn segment(id: &str, start_ts: f64, end_ts: f64) -> Segment {
    Segment {
        id: id.to_string(),
        start_ts,
        end_ts,
        frame_count: 300,
        fps: Some(30.0),
        video_path: PathBuf::from(format!("chunks/{id}.mp4")),
    }
}

fn handle_for(segment: &Segment) -> MediaHandle {
    MediaHandle {
        path: segment.video_path.clone(),
        duration: segment.video_duration(),
        width: 4,
        height: 4,
    }
}

fn still() -> StillFrame {
    StillFrame {
        width: 1,
        height: 1,
        bytes: Arc::from(vec![0; 4]),
    }
}

fn progress(segment_id: &str, offset: f64) -> SessionMessage {
    SessionMessage::Progress {
        segment_id: segment_id.to_string(),
        offset,
    }
}

fn current_id(fixture: &Fixture) -> Option<&str> {
    fixture
        .session
        .current_segment()
        .map(|segment| segment.id.as_str())
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
