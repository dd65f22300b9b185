//! Wall clock used to compute trigger instants

use chrono::DateTime;
use chrono::Local;

/// Source of the current wall clock time
pub trait Clock: Send + Sync {
    /// The current local time
    fn now(&self) -> DateTime<Local>;
}

/// The system clock in the local timezone
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
