//! Monotonic millisecond clock for tile age accounting.
//!
//! Timestamps are millis since the first call in this process, so they fit
//! an `AtomicU64` and survive comparison math without `Instant` plumbing.
//! Classification functions take explicit `now` values; tests drive them
//! with synthetic clocks.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since the process-wide epoch.
pub fn now_ms() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
