//! Time source abstraction
//!
//! The Runner, Poller, and Context all need "now" and all need to be
//! testable against the fake-clock scenarios in SPEC_FULL.md §8, so every
//! "now" in the engine goes through this trait rather than calling
//! `Utc::now()` directly - the same seam other_examples' daemon lifecycle
//! code gets from `oj_core::SystemClock`.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time via `Utc::now()`. The production default everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
