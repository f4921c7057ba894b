//! Wall-clock source
//!
//! The peak-window test and the ledger's `time_str` read local time through
//! this trait so tests can pin the hour.

use chrono::{DateTime, Local, TimeZone, Timelike};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Local hour of day, 0..=23
    fn local_hour(&self) -> u32 {
        self.now().hour()
    }

    /// Milliseconds since Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Reads the host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    /// Clock pinned to a local date and time. Returns `None` for times that
    /// do not exist in the local zone (DST gaps).
    pub fn at_local(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Local
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .earliest()
            .map(Self::new)
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut current = self.current.lock();
        *current += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock()
    }
}
