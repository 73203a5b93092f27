//! A bounded, per-slot-stamped ring buffer.
//!
//! Grounded in the teacher crate's `circ.rs` (broadcast/unicast connection
//! bitmasks over an `AtomicU32`, CAS-retry-with-backoff idiom) and enriched
//! with the classic Vyukov-style MPMC bounded queue shape (per-slot
//! sequence stamp instead of a single head/tail pair), which is what lets
//! producers and consumers make progress on different slots concurrently.
//! Used both as the cross-thread request inbox (single producer per
//! sender, single consumer — the owning strand) and, in "locked consumer"
//! mode, as the combiner's hand-off queue (`TicketLock` serialises which
//! caller drains a batch).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backoff::Backoff;

struct Slot<T> {
    /// Sequence stamp: a slot is ready to write when `stamp == write_pos`,
    /// ready to read when `stamp == write_pos + 1`.
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded multi-producer multi-consumer ring. `capacity` is rounded up
/// to the next power of two internally for cheap index masking.
pub struct Ring<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    enqueue_pos: AtomicUsize,
    dequeue_pos: AtomicUsize,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(2);
        let buffer: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            buffer,
            mask: capacity - 1,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Attempt to enqueue without blocking. Returns `Err(value)` if full.
    pub fn try_enqueue(&self, value: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = stamp as isize - pos as isize;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { (*slot.value.get()).write(value) };
                    slot.stamp.store(pos + 1, Ordering::Release);
                    return Ok(());
                }
            } else if diff < 0 {
                return Err(value); // full
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Enqueue, spinning with back-off until a slot frees up.
    pub fn enqueue(&self, mut value: T) {
        let mut b = Backoff::new();
        loop {
            match self.try_enqueue(value) {
                Ok(()) => return,
                Err(v) => {
                    value = v;
                    b.snooze();
                }
            }
        }
    }

    /// Attempt to dequeue without blocking. Returns `None` if empty.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let diff = stamp as isize - (pos as isize + 1);
            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { (*slot.value.get()).assume_init_read() };
                    slot.stamp.store(pos + self.buffer.len() + 1, Ordering::Release);
                    return Some(value);
                }
            } else if diff < 0 {
                return None; // empty
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue, spinning with back-off until an item is available.
    pub fn dequeue(&self) -> T {
        let mut b = Backoff::new();
        loop {
            if let Some(v) = self.try_dequeue() {
                return v;
            }
            b.snooze();
        }
    }

    /// Best-effort count of items currently queued (may be stale the
    /// instant it's read under concurrent access; used for diagnostics).
    pub fn len_hint(&self) -> usize {
        let e = self.enqueue_pos.load(Ordering::Relaxed);
        let d = self.dequeue_pos.load(Ordering::Relaxed);
        e.saturating_sub(d)
    }
}

/// A single-producer/single-consumer specialisation: the producer cursor
/// needs no CAS (only one writer ever touches it), and the consumer is
/// similarly unsynchronised on its own side. Used for the per-connection
/// reader/writer fiber hand-off where producer and consumer are strictly
/// one strand each.
pub struct SpscRing<T> {
    inner: Ring<T>,
}

impl<T> SpscRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: Ring::with_capacity(capacity) }
    }

    pub fn try_push(&self, value: T) -> Result<(), T> {
        self.inner.try_enqueue(value)
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.try_dequeue()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_threaded() {
        let r: Ring<u32> = Ring::with_capacity(4);
        assert!(r.try_enqueue(1).is_ok());
        assert!(r.try_enqueue(2).is_ok());
        assert!(r.try_enqueue(3).is_ok());
        assert!(r.try_enqueue(4).is_ok());
        assert!(r.try_enqueue(5).is_err());
        assert_eq!(r.try_dequeue(), Some(1));
        assert_eq!(r.try_dequeue(), Some(2));
        assert_eq!(r.try_dequeue(), Some(3));
        assert_eq!(r.try_dequeue(), Some(4));
        assert_eq!(r.try_dequeue(), None);
    }

    #[test]
    fn mpmc_no_loss_under_contention() {
        let ring = Arc::new(Ring::<u64>::with_capacity(256));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let ring = Arc::clone(&ring);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        ring.enqueue(p * 1000 + i);
                    }
                })
            })
            .collect();

        let consumer_total = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                let total = Arc::clone(&consumer_total);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let v = ring.dequeue();
                        total.fetch_add(v, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }

        let expected: u64 = (0..4u64).map(|p| (0..1000u64).map(|i| p * 1000 + i).sum::<u64>()).sum();
        assert_eq!(consumer_total.load(Ordering::Relaxed), expected);
    }
}
