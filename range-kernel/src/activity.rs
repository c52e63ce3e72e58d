use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy)]
struct LastActivity {
    at: Instant,
    wall: OffsetDateTime,
}

/// Timestamp of the last request, behind its own lock so that it never
/// contends with inventory access.
#[derive(Clone)]
pub struct ActivityTracker {
    last: Arc<Mutex<LastActivity>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(LastActivity {
                at: Instant::now(),
                wall: OffsetDateTime::now_utc(),
            })),
        }
    }

    pub fn touch(&self) {
        *self.last.lock() = LastActivity { at: Instant::now(), wall: OffsetDateTime::now_utc() };
    }

    pub fn idle_since(&self) -> Duration {
        self.last.lock().at.elapsed()
    }

    pub fn last_activity(&self) -> OffsetDateTime {
        self.last.lock().wall
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}
