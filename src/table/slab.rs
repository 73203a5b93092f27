//! The chunked, index-stable slot array backing a partition's entries
//! (spec.md §9: "model as a growable array of index-stable slots using
//! chunked pages; addressing via `partition + slot_index` is stable
//! because chunks are never freed, only appended" — standing in for the
//! source's mmap-reserved entry slab).
//!
//! Grounded in the teacher crate's `chunk_storage.rs` shape (fixed-size
//! chunks appended to a directory, never moved once published) adapted
//! from shared-memory chunk storage to an in-process `Vec<Box<[Slot]>>`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

use super::entry::{Entry, State};

/// Slot index sentinel meaning "no link" (end of a chain or free list).
pub const NONE: u32 = u32::MAX;

const CHUNK_LEN: usize = 4096;

struct Slot {
    state: AtomicU8,
    ref_count: AtomicU16,
    /// Bucket-chain link while `Used`/`NotUsed`; free-list link while `Free`.
    next: AtomicU32,
    entry: UnsafeCell<MaybeUninit<Entry>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: AtomicU8::new(State::Free.encode()),
            ref_count: AtomicU16::new(0),
            next: AtomicU32::new(NONE),
            entry: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

unsafe impl Sync for Slot {}

/// A growable array of entry slots. Chunks are pushed but never
/// reallocated or removed, so a `u32` slot index is a stable address for
/// the lifetime of the partition.
pub struct EntrySlab {
    chunks: Vec<Box<[Slot]>>,
    /// Number of slots ever handed out (`entries_end` in spec terms); the
    /// tail of the last chunk beyond this is reserved-but-void.
    len: u32,
}

impl EntrySlab {
    pub fn new() -> Self {
        Self { chunks: Vec::new(), len: 0 }
    }

    fn capacity(&self) -> u32 {
        (self.chunks.len() * CHUNK_LEN) as u32
    }

    fn slot(&self, index: u32) -> &Slot {
        let chunk = index as usize / CHUNK_LEN;
        let offset = index as usize % CHUNK_LEN;
        &self.chunks[chunk][offset]
    }

    fn grow(&mut self) {
        let chunk: Vec<Slot> = (0..CHUNK_LEN).map(|_| Slot::empty()).collect();
        self.chunks.push(chunk.into_boxed_slice());
    }

    /// Reserve the next void slot, extending `entries_end`, allocating a
    /// fresh chunk if the current one is exhausted. Returns its index.
    pub fn reserve_void(&mut self) -> u32 {
        if self.len >= self.capacity() {
            self.grow();
        }
        let index = self.len;
        self.len += 1;
        index
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn state(&self, index: u32) -> State {
        State::decode(self.slot(index).state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, index: u32, state: State) {
        self.slot(index).state.store(state.encode(), Ordering::Release);
    }

    pub fn next(&self, index: u32) -> u32 {
        self.slot(index).next.load(Ordering::Acquire)
    }

    pub fn set_next(&self, index: u32, next: u32) {
        self.slot(index).next.store(next, Ordering::Release);
    }

    pub fn ref_count(&self, index: u32) -> u16 {
        self.slot(index).ref_count.load(Ordering::Acquire)
    }

    /// Publish a freshly built entry into a reserved slot, marking it
    /// live with one implicit reference held by the bucket chain itself.
    pub fn publish(&self, index: u32, entry: Entry, state: State) {
        let slot = self.slot(index);
        unsafe { (*slot.entry.get()).write(entry) };
        slot.ref_count.store(1, Ordering::Release);
        slot.state.store(state.encode(), Ordering::Release);
    }

    /// Borrow the entry at `index`. Only valid while the slot is `Used`
    /// or `NotUsed` (i.e. after `publish`, before the final ref drops and
    /// the slot is recycled).
    pub fn entry(&self, index: u32) -> &Entry {
        unsafe { (*self.slot(index).entry.get()).assume_init_ref() }
    }

    /// A raw pointer into the entry's storage, valid for as long as the
    /// slot isn't retired — chunks are appended, never moved or freed, so
    /// this remains valid even after the slab grows further, letting a
    /// caller hold it past the lock that produced it (see
    /// `partition::EntryHandle`).
    pub fn entry_ptr(&self, index: u32) -> *const Entry {
        unsafe { (*self.slot(index).entry.get()).as_ptr() }
    }

    pub fn add_ref(&self, index: u32) {
        self.slot(index).ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference. Returns `true` if this was the last one — the
    /// caller must then tear down the stored `Entry` and return the slot
    /// to the free list.
    pub fn drop_ref(&self, index: u32) -> bool {
        self.slot(index).ref_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Tear down the entry stored at `index` and mark the slot `Free`.
    /// Caller must hold the free-list lock and guarantee `ref_count`
    /// already reached zero.
    pub fn retire(&self, index: u32) -> usize {
        let slot = self.slot(index);
        let entry = unsafe { (*slot.entry.get()).assume_init_read() };
        let size = entry.entry_size();
        slot.state.store(State::Free.encode(), Ordering::Release);
        drop(entry);
        size
    }
}

impl Default for EntrySlab {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_grows_chunks_as_needed() {
        let mut slab = EntrySlab::new();
        for _ in 0..(CHUNK_LEN + 10) {
            slab.reserve_void();
        }
        assert_eq!(slab.len(), (CHUNK_LEN + 10) as u32);
    }

    #[test]
    fn publish_and_retire_round_trip() {
        let mut slab = EntrySlab::new();
        let idx = slab.reserve_void();
        let entry = Entry::new(b"k", b"v", 0, 0, 1, 1);
        slab.publish(idx, entry, State::Used(0));
        assert_eq!(slab.ref_count(idx), 1);
        assert_eq!(slab.entry(idx).value(), b"v");
        assert!(slab.drop_ref(idx));
        slab.set_state(idx, State::NotUsed);
        let freed = slab.retire(idx);
        assert!(freed > 0);
        assert_eq!(slab.state(idx), State::Free);
    }
}
