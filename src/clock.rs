//! Wall-clock source for item timestamps.

use chrono::{Local, NaiveDateTime, Timelike};
use std::sync::Mutex;

/// Source of the local date and time stamped on ledger items.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Current time truncated to whole seconds, as stored on records.
    fn stamp(&self) -> NaiveDateTime {
        let now = self.now();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Local system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
