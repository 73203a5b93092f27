//! Wait-sets for parking fibers on a shared event (spec.md §4.C
//! "Waitset"). Two shapes, matching the spec exactly:
//!
//! - [`WaitSet`]: multi-waiter with an external lock — a stack of
//!   wait-entries, used when more than one fiber can legitimately be
//!   parked on the same thing (a partition's "room available" signal, a
//!   connection's shutdown broadcast).
//! - [`UniqueWaiter`]: a single atomic slot, used for one-shot handoffs
//!   where only ever one fiber is parked at a time (the delegate-mode
//!   future, a per-sink readiness wait).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::primitives::SpinLock;

use super::strand::FiberId;

const NONE: u32 = u32::MAX;

/// Multi-waiter wait-set: any number of fibers may be parked here;
/// `signal` wakes one, `broadcast` wakes all.
pub struct WaitSet {
    lock: SpinLock,
    waiters: std::cell::UnsafeCell<Vec<FiberId>>,
}

unsafe impl Send for WaitSet {}
unsafe impl Sync for WaitSet {}

impl WaitSet {
    pub fn new() -> Self {
        Self { lock: SpinLock::new(), waiters: std::cell::UnsafeCell::new(Vec::new()) }
    }

    pub fn park(&self, fiber: FiberId) {
        self.lock.lock();
        unsafe { (*self.waiters.get()).push(fiber) };
        self.lock.unlock();
    }

    /// Pop one waiter (FIFO), if any.
    pub fn wake_one(&self) -> Option<FiberId> {
        self.lock.lock();
        let popped = unsafe {
            let v = &mut *self.waiters.get();
            if v.is_empty() {
                None
            } else {
                Some(v.remove(0))
            }
        };
        self.lock.unlock();
        popped
    }

    /// Drain every waiter (FIFO order preserved).
    pub fn wake_all(&self) -> Vec<FiberId> {
        self.lock.lock();
        let drained = unsafe { std::mem::take(&mut *self.waiters.get()) };
        self.lock.unlock();
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.lock.lock();
        let empty = unsafe { (*self.waiters.get()).is_empty() };
        self.lock.unlock();
        empty
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot waiter: `signal` wakes it with a release fence, matching
/// spec.md's "unique-waiter" shape. Parking twice without an intervening
/// signal is a programmer error (fatal per §4.C "double-wake").
pub struct UniqueWaiter {
    slot: AtomicU32,
}

impl UniqueWaiter {
    pub fn new() -> Self {
        Self { slot: AtomicU32::new(NONE) }
    }

    pub fn park(&self, fiber: FiberId) {
        let prev = self.slot.swap(fiber, Ordering::AcqRel);
        assert_eq!(prev, NONE, "UniqueWaiter parked twice without an intervening signal");
    }

    /// Wake the parked fiber, if any, clearing the slot.
    pub fn signal(&self) -> Option<FiberId> {
        let prev = self.slot.swap(NONE, Ordering::AcqRel);
        if prev == NONE {
            None
        } else {
            Some(prev)
        }
    }
}

impl Default for UniqueWaiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waitset_wakes_in_fifo_order() {
        let ws = WaitSet::new();
        ws.park(1);
        ws.park(2);
        ws.park(3);
        assert_eq!(ws.wake_one(), Some(1));
        assert_eq!(ws.wake_all(), vec![2, 3]);
        assert!(ws.is_empty());
    }

    #[test]
    fn unique_waiter_round_trips() {
        let w = UniqueWaiter::new();
        assert_eq!(w.signal(), None);
        w.park(7);
        assert_eq!(w.signal(), Some(7));
        assert_eq!(w.signal(), None);
    }

    #[test]
    #[should_panic(expected = "parked twice")]
    fn double_park_without_signal_panics() {
        let w = UniqueWaiter::new();
        w.park(1);
        w.park(2);
    }
}
