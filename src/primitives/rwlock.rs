// Port of the teacher crate's `rw_lock.rs` (cpp-ipc's `ipc::rw_lock`):
// a single-word atomic read-write lock using bit flags.
// - High bit (w_flag) marks exclusive/write lock.
// - Low bits count concurrent shared/read locks.
// Used by the event listener's common-poller registry (§4.D): membership
// is read on every poll cycle and written only when a sink joins or
// leaves the shared set.

use std::sync::atomic::{AtomicU32, Ordering};

use super::backoff::Backoff;

const W_MASK: u32 = i32::MAX as u32;   // 0x7FFF_FFFF — reader count mask
const W_FLAG: u32 = W_MASK + 1;        // 0x8000_0000 — writer flag

/// A single-word atomic read-write lock.
///
/// Port of `ipc::rw_lock` from cpp-ipc. Writers get exclusive access,
/// multiple readers can hold the lock concurrently.
///
/// The high bit signals a write lock; the remaining 31 bits count active readers.
pub struct RwLock {
    lc: AtomicU32,
}

impl RwLock {
    /// Create a new unlocked read-write lock.
    pub const fn new() -> Self {
        Self { lc: AtomicU32::new(0) }
    }

    /// Acquire an exclusive (write) lock.
    pub fn lock(&self) {
        let mut b = Backoff::new();
        loop {
            let old = self.lc.fetch_or(W_FLAG, Ordering::AcqRel);
            if old == 0 {
                return; // got w-lock, no readers
            }
            if old & W_FLAG == 0 {
                break; // readers present but no other writer — wait for them to finish
            }
            // another writer holds the lock, spin
            b.snooze();
        }
        // Wait for all readers to finish
        let mut b = Backoff::new();
        while self.lc.load(Ordering::Acquire) & W_MASK != 0 {
            b.snooze();
        }
    }

    /// Release the exclusive (write) lock.
    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }

    /// Acquire a shared (read) lock.
    pub fn lock_shared(&self) {
        let mut old = self.lc.load(Ordering::Acquire);
        let mut b = Backoff::new();
        loop {
            if old & W_FLAG != 0 {
                // writer is active, spin
                b.snooze();
                old = self.lc.load(Ordering::Acquire);
            } else if self
                .lc
                .compare_exchange_weak(old, old + 1, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            } else {
                // CAS failed, `old` has been updated by compare_exchange_weak
                old = self.lc.load(Ordering::Acquire);
            }
        }
    }

    /// Release a shared (read) lock.
    pub fn unlock_shared(&self) {
        self.lc.fetch_sub(1, Ordering::Release);
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}
