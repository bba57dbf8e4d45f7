//! Monotonic wallclock used to timestamp queued events.
//!
//! All `when` values are durations relative to the first time this module is
//! touched in the process (an arbitrary epoch), following `Looper::GetNow`/
//! `Looper::GetNowUs` in the original `baseutils` C++ library: callers never
//! compare timestamps across processes, only within this one.

use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Duration elapsed since the process-wide epoch, i.e. "now" for queue
/// ordering purposes.
pub fn now() -> Duration {
    EPOCH.elapsed()
}

/// `now()` expressed in whole microseconds, matching `Looper::GetNowUs`.
pub fn now_micros() -> i64 {
    now().as_micros() as i64
}
