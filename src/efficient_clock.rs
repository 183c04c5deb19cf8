//! Coarse wall-clock utilities for cheap log timestamps.
//!
//! Reading the system clock on every forwarded chunk is wasted work when
//! rotation only cares about whole seconds. The reactor thread refreshes a
//! process-wide cached second counter once per tick (and after every batch of
//! readiness events); everyone else reads the cache with a single atomic load.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as of the last refresh. Zero means "never
/// refreshed".
static COARSE_SECONDS: AtomicI64 = AtomicI64::new(0);

/// Returns the cached wall-clock second.
///
/// The value lags the real clock by at most one reactor tick. Before the
/// first refresh the real clock is read instead, so callers never observe the
/// epoch.
///
/// # Examples
///
/// ```
/// # use redirect_logger::efficient_clock::{current_seconds, wall_clock_seconds};
/// let coarse = current_seconds();
/// assert!(coarse <= wall_clock_seconds());
/// ```
#[inline(always)]
pub fn current_seconds() -> i64 {
    match COARSE_SECONDS.load(Ordering::Relaxed) {
        0 => wall_clock_seconds(),
        seconds => seconds,
    }
}

/// Re-reads the system clock into the cache and returns the new value.
///
/// Only the reactor thread calls this in normal operation.
pub fn refresh() -> i64 {
    let now = wall_clock_seconds();
    COARSE_SECONDS.store(now, Ordering::Relaxed);
    now
}

/// Reads the system clock directly, in whole seconds since the Unix epoch.
pub fn wall_clock_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
