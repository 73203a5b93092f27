// Port of the teacher crate's `spin_lock.rs` (itself a port of cpp-ipc's
// `ipc::spin_lock`), generalised to share the `Backoff` helper and
// extended with the two sibling locks the dispatch layer needs: a ticket
// lock for the combiner's "one drains a batch" protocol, and a bare
// test-and-set lock for the partition free-list (§4.E: "decouple
// allocation stalls from lookup critical paths" — contention there is
// rare enough that adaptive back-off is pure overhead).

use std::sync::atomic::{AtomicU32, Ordering};

use super::backoff::Backoff;

/// A lock-free spin lock with adaptive backoff.
///
/// Used for the partition lookup lock and the event listener's retire
/// queue: held for the duration of a single chain walk or a short
/// registration step, never across a suspension point.
pub struct SpinLock {
    lc: AtomicU32,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self { lc: AtomicU32::new(0) }
    }

    pub fn lock(&self) {
        let mut b = Backoff::new();
        while self.lc.swap(1, Ordering::Acquire) != 0 {
            b.snooze();
        }
    }

    /// Try once, non-blocking.
    pub fn try_lock(&self) -> bool {
        self.lc.swap(1, Ordering::Acquire) == 0
    }

    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// A bare test-and-set lock with no back-off escalation: every retry is a
/// busy spin. Appropriate only for locks held so briefly (a free-list
/// pop/push) that installing a yield/sleep policy would cost more than the
/// contention it resolves.
pub struct RawLock {
    lc: AtomicU32,
}

impl RawLock {
    pub const fn new() -> Self {
        Self { lc: AtomicU32::new(0) }
    }

    pub fn lock(&self) {
        while self.lc.swap(1, Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }

    pub fn unlock(&self) {
        self.lc.store(0, Ordering::Release);
    }
}

impl Default for RawLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for RawLock {}
unsafe impl Sync for RawLock {}

/// A ticket lock: acquirers take a numbered ticket and spin until it is
/// "now serving". Used by the combiner (§4.F) so that whichever caller
/// currently holds the ticket drains the whole pending batch off the ring
/// in one critical section, amortising the lock over many actions.
pub struct TicketLock {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
}

impl TicketLock {
    pub const fn new() -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
        }
    }

    /// Take a ticket and block until it is ours.
    pub fn lock(&self) -> TicketGuard<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut b = Backoff::new();
        while self.now_serving.load(Ordering::Acquire) != ticket {
            b.snooze();
        }
        TicketGuard { lock: self }
    }

    /// Non-blocking: succeeds only if no one is ahead of us in line.
    pub fn try_lock(&self) -> Option<TicketGuard<'_>> {
        let serving = self.now_serving.load(Ordering::Acquire);
        if self
            .next_ticket
            .compare_exchange(serving, serving + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Some(TicketGuard { lock: self })
        } else {
            None
        }
    }

    fn release(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
    }
}

impl Default for TicketLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for TicketLock {}
unsafe impl Sync for TicketLock {}

/// RAII guard releasing the ticket on drop.
pub struct TicketGuard<'a> {
    lock: &'a TicketLock,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// A `SpinLock` paired with the data it protects, RAII-style. The table
/// partition uses this for its bucket array, entry slab and free-list:
/// the spec calls these out as separate locks held only for the duration
/// of a chain walk or a pop/push, never across a suspension point, which
/// is exactly the shape a guard-on-drop wrapper enforces.
pub struct Guarded<T> {
    lock: SpinLock,
    data: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Guarded<T> {}
unsafe impl<T: Send> Sync for Guarded<T> {}

impl<T> Guarded<T> {
    pub const fn new(data: T) -> Self {
        Self { lock: SpinLock::new(), data: std::cell::UnsafeCell::new(data) }
    }

    pub fn lock(&self) -> GuardedRef<'_, T> {
        self.lock.lock();
        GuardedRef { owner: self }
    }

    /// Bypass the lock entirely. Callers must already hold some other
    /// guarantee of exclusivity (e.g. single-threaded start-up).
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

pub struct GuardedRef<'a, T> {
    owner: &'a Guarded<T>,
}

impl<T> std::ops::Deref for GuardedRef<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.owner.data.get() }
    }
}

impl<T> std::ops::DerefMut for GuardedRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<T> Drop for GuardedRef<'_, T> {
    fn drop(&mut self) {
        self.owner.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn spin_lock_mutual_exclusion() {
        let lock = Arc::new(SpinLock::new());
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                    lock.unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn ticket_lock_is_fifo_safe() {
        let lock = Arc::new(TicketLock::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut handles = vec![];
        for i in 0..16 {
            let lock = Arc::clone(&lock);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _g = lock.lock();
                order.lock().unwrap().push(i);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(order.lock().unwrap().len(), 16);
    }
}
