use std::time::{Duration, Instant};

/// Trailing-edge save coalescing: a save becomes due once `delay` has passed
/// since the most recent edit.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    delay: Duration,
    last_edit: Option<Instant>,
}

impl SaveDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_edit: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record an edit, pushing the deadline back.
    pub fn touch(&mut self, now: Instant) {
        self.last_edit = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_edit.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last_edit.map(|at| at + self.delay)
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Returns `true` once per burst of edits, when the save should run.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.due(now) {
            self.last_edit = None;
            true
        } else {
            false
        }
    }

    /// For immediate saves: clears the pending edit, returning whether there was one.
    pub fn flush(&mut self) -> bool {
        self.last_edit.take().is_some()
    }
}
