//! Adaptive back-off: pause → compiler fence → yield → sleep.
//!
//! Grounded in the teacher crate's `spin_lock::adaptive_yield` (pause for a
//! handful of counts, then `spin_loop`, then `thread::yield_now`, then a 1ms
//! sleep), generalised with an installable cooperative-yield hook so the
//! fiber scheduler (`fiber::strand`) can deschedule the current fiber
//! instead of blocking the OS thread once contention is heavy.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const SPIN_LIMIT: u32 = 4;
const PAUSE_LIMIT: u32 = 16;
const YIELD_LIMIT: u32 = 32;

thread_local! {
    /// Installed once per OS thread by the fiber strand running on it.
    /// When set, `Backoff::snooze` calls this instead of sleeping the OS
    /// thread, letting other fibers on the same strand make progress.
    static COOPERATIVE_YIELD: Cell<Option<fn()>> = Cell::new(None);
}

static ANY_THREAD_COOPERATIVE: AtomicBool = AtomicBool::new(false);

/// Install a cooperative-yield callback for the current OS thread. Called
/// once by `fiber::strand::Strand::run` on strand entry.
pub fn install_cooperative_yield(f: fn()) {
    COOPERATIVE_YIELD.with(|c| c.set(Some(f)));
    ANY_THREAD_COOPERATIVE.store(true, Ordering::Relaxed);
}

/// Remove the cooperative-yield hook (strand teardown / tests).
pub fn clear_cooperative_yield() {
    COOPERATIVE_YIELD.with(|c| c.set(None));
}

/// A counter-driven back-off helper. Each call to `snooze` escalates: a
/// fixed number of busy-spins, then CPU-pause hints, then either a
/// cooperative fiber yield (if installed) or an OS thread yield, then a
/// short sleep once truly stalled. The counter saturates rather than
/// growing unboundedly.
pub struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Whether the caller has spun long enough that blocking (rather than
    /// spinning further) is likely the better next move.
    #[inline]
    pub fn is_stalled(&self) -> bool {
        self.step >= YIELD_LIMIT
    }

    /// Escalate by one step.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < SPIN_LIMIT {
            // busy spin: nothing between iterations
        } else if self.step < PAUSE_LIMIT {
            std::hint::spin_loop();
        } else if self.step < YIELD_LIMIT {
            let yielded = COOPERATIVE_YIELD.with(|c| {
                if let Some(f) = c.get() {
                    f();
                    true
                } else {
                    false
                }
            });
            if !yielded {
                thread::yield_now();
            }
        } else {
            thread::sleep(Duration::from_millis(1));
            return;
        }
        self.step = self.step.saturating_add(1);
    }

    /// Reset to the initial (busy-spin) state — used when a loop makes
    /// progress and wants to shed accumulated back-off before the next
    /// contended attempt.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
