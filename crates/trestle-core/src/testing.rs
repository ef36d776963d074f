//! Fake clock for deterministic tests
//!
//! Exposed as a normal (non-`cfg(test)`) module so that `trestle-engine` and
//! `trestle-store` can depend on it from their own test suites without a
//! dev-dependency cycle back onto this crate.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::clock::Clock;

/// A clock that only moves when told to. Mirrors the literal fake-clock
/// scenarios in SPEC_FULL.md §8 (`t=1_000_000` and friends).
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(instant),
        }
    }

    /// Starting at the Unix epoch plus `millis` milliseconds, matching the
    /// `t=1_000_000`-style inputs in the end-to-end scenarios.
    pub fn at_millis(millis: i64) -> Self {
        Self::at(DateTime::UNIX_EPOCH + Duration::milliseconds(millis))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("fake clock poisoned");
        *now += by;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().expect("fake clock poisoned") = instant;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("fake clock poisoned")
    }
}
