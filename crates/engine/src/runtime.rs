use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::index::SegmentIndex;
use crate::jobs::JobDispatcher;
use crate::media::{MediaBackend, MediaOutput};
use crate::session::{Command, Event, PlaybackSession, SessionMessage};
use crate::time::AbsoluteTime;
use crate::worker::WorkerPool;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receiver of session events on the UI side.
pub type SessionEventReceiver = mpsc::Receiver<Event>;

/// Cloneable handle to a session running on its own thread.
///
/// Every method only enqueues a message; failures mean the session thread
/// has already stopped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    messages: mpsc::Sender<SessionMessage>,
}

impl SessionHandle {
    pub fn play(&self) -> bool {
        self.send(Command::Play.into())
    }

    pub fn pause(&self) -> bool {
        self.send(Command::Pause.into())
    }

    pub fn toggle_play_pause(&self) -> bool {
        self.send(Command::TogglePlayPause.into())
    }

    pub fn scrub(&self, to: AbsoluteTime) -> bool {
        self.send(Command::Scrub { to }.into())
    }

    pub fn update(&self, to: AbsoluteTime) -> bool {
        self.send(Command::Update { to }.into())
    }

    pub fn schedule_update(&self, to: AbsoluteTime) -> bool {
        self.send(Command::ScheduleUpdate { to }.into())
    }

    pub fn refresh_index(&self) -> bool {
        self.send(SessionMessage::RefreshIndex)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionMessage::Shutdown)
    }

    /// Delivers a raw message, e.g. a progress report from a host player.
    pub fn send(&self, message: SessionMessage) -> bool {
        self.messages.send(message).is_ok()
    }
}

/// Running session thread.
#[derive(Debug)]
pub struct SessionRuntime {
    pub handle: SessionHandle,
    pub events: SessionEventReceiver,
    thread: Option<JoinHandle<()>>,
}

impl SessionRuntime {
    /// Asks the session to stop and waits for its thread.
    pub fn join(self) {
        let Self {
            handle,
            events,
            thread,
        } = self;
        drop(events);
        let _ = handle.shutdown();
        if let Some(thread) = thread
            && thread.join().is_err()
        {
            warn!("session thread panicked");
        }
    }
}

/// Starts a session on a dedicated thread with its own worker pool.
///
/// The session loop blocks on its inbox until the earliest of the next
/// debounce deadline, progress tick or index refresh.
pub fn spawn_session<O>(
    config: EngineConfig,
    index: SegmentIndex,
    backend: Arc<dyn MediaBackend>,
    output: O,
) -> SessionRuntime
where
    O: MediaOutput + Send + 'static,
{
    let (message_tx, message_rx) = mpsc::channel::<SessionMessage>();
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let worker_results = message_tx.clone();

    let thread = thread::Builder::new()
        .name("playback-session".to_string())
        .spawn(move || {
            let pool = WorkerPool::spawn(config.workers.count, backend, worker_results);
            let session = PlaybackSession::new(&config, index, output, pool);
            run_session(session, &config, message_rx, event_tx);
        });
    let thread = match thread {
        Ok(thread) => Some(thread),
        Err(error) => {
            warn!(%error, "failed to spawn session thread");
            None
        }
    };

    SessionRuntime {
        handle: SessionHandle {
            messages: message_tx,
        },
        events: event_rx,
        thread,
    }
}

fn run_session<O, D>(
    mut session: PlaybackSession<O, D>,
    config: &EngineConfig,
    messages: mpsc::Receiver<SessionMessage>,
    events: mpsc::SyncSender<Event>,
) where
    O: MediaOutput,
    D: JobDispatcher,
{
    let tick_interval = config.playback.tick_interval();
    let refresh_interval =
        Some(config.playback.index_refresh()).filter(|interval| !interval.is_zero());
    let mut next_tick = Instant::now() + tick_interval;
    let mut next_refresh = refresh_interval.map(|interval| Instant::now() + interval);
    info!(segments = session.index().len(), "session started");

    loop {
        let now = Instant::now();
        let wake = [Some(next_tick), next_refresh, session.next_deadline()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(next_tick);

        let emitted = match messages.recv_timeout(wake.saturating_duration_since(now)) {
            Ok(SessionMessage::Shutdown) => {
                let emitted = session.handle(SessionMessage::Shutdown, Instant::now());
                let _ = forward(&events, emitted);
                debug!("session shutting down");
                return;
            }
            Ok(message) => session.handle(message, Instant::now()),
            Err(mpsc::RecvTimeoutError::Timeout) => Vec::new(),
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        };
        if !forward(&events, emitted) {
            return;
        }

        let now = Instant::now();
        let mut emitted = session.handle_timers(now);
        if now >= next_tick {
            emitted.extend(session.poll_output(now));
            next_tick = now + tick_interval;
        }
        if let (Some(interval), Some(due)) = (refresh_interval, next_refresh)
            && now >= due
        {
            emitted.extend(session.handle(SessionMessage::RefreshIndex, now));
            next_refresh = Some(now + interval);
        }
        if !forward(&events, emitted) {
            return;
        }
    }
}

fn forward(events: &mpsc::SyncSender<Event>, emitted: Vec<Event>) -> bool {
    for event in emitted {
        if events.send(event).is_err() {
            return false;
        }
    }
    true
}
