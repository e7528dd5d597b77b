use std::time::{Duration, Instant};

/// Single-slot debounce timer.
///
/// Arming replaces whatever was pending, so at most one action per slot is
/// ever in flight.
#[derive(Debug, Clone)]
pub struct DebounceSlot<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> DebounceSlot<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Arms the slot to fire `delay` after `now`, dropping any prior value.
    pub fn arm(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.delay, value));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Takes the pending value if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, value)| value),
            _ => None,
        }
    }
}
