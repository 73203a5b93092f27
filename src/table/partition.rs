//! One shard of the cache table (spec.md §3 "Partition", §4.E).
//!
//! Grounded in the teacher crate's `chunk_storage.rs` (index-stable
//! chunked storage) and `spin_lock.rs`/`rw_lock.rs` idioms, composed into
//! the bucket array + CLOCK eviction + stride resize design of §4.E.
//!
//! Simplification noted in DESIGN.md: the bucket array, entry slab and
//! free list are folded under a single `Guarded` spin lock rather than
//! the spec's two decoupled locks (lookup vs free-list); slab growth is
//! O(1) amortised and rarely contended enough for the split to matter
//! here, and a single lock keeps the index-stable-pointer argument for
//! `EntryHandle` straightforward to state.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::primitives::Guarded;

use super::entry::{normalize_exp_time, Entry, State, USED_MAX, USED_MIN};
use super::slab::{EntrySlab, NONE};

pub fn now_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

const STRIDE_SIZE: u32 = 64;
const EVICT_SWEEP_MAX: u32 = 4096;

struct PartitionInner {
    buckets: Vec<u32>,
    nbuckets: u32,
    /// Largest power-of-two bucket count reached by a completed doubling
    /// round; `nbuckets` grows from `base` towards `2 * base` in
    /// `STRIDE_SIZE`-bucket steps as `resize_step` runs, and `base`
    /// itself doubles only once `nbuckets` catches up to it.
    base: u32,
    entries: EntrySlab,
    free_list: Vec<u32>,
    stamp: u64,
    flush_stamp: u64,
    clock_hand: u32,
}

impl PartitionInner {
    /// Split-addressing per §4.E: a plain `hash % nbuckets` would change
    /// every key's target bucket the instant `nbuckets` ticks upward,
    /// stranding entries in buckets that `resize_step` hasn't rehashed
    /// yet. Instead address against the round's full modulus `2 * base`
    /// and fold back into the not-yet-split half (`idx - base`) whenever
    /// that lands past the currently-live bucket count — exactly the
    /// buckets `resize_step` hasn't split off `source` into `target` for
    /// yet, so they're still found at `source`.
    fn bucket_index(&self, hash: u32, part_bits: u32) -> usize {
        let base = self.base.max(1) as usize;
        let raw = (hash >> part_bits) as usize;
        let idx = raw % (2 * base);
        if idx >= self.nbuckets as usize {
            idx - base
        } else {
            idx
        }
    }
}

pub enum UpdateOutcome {
    /// No existing entry matched the key.
    NotFound,
    /// An existing entry matched but its CAS stamp disagreed; the caller
    /// gets a handle to the current value to report "exists"/mismatch.
    CasMismatch(EntryHandle),
    /// The match succeeded and the new entry replaced it.
    Replaced,
}

pub enum InsertOutcome {
    Inserted,
    /// Something was already there under this key.
    AlreadyExists(EntryHandle),
}

/// One shard of the table, owned by exactly one worker thread (ownership
/// is enforced by the dispatch layer, not by this type — `Partition`
/// itself is `Send + Sync` so delegate/combine modes can reach it from
/// other threads' request-formatting code).
pub struct Partition {
    pub id: u32,
    nparts: u32,
    part_bits: u32,
    inner: Guarded<PartitionInner>,
    volume: AtomicUsize,
    volume_budget: usize,
    nbuckets_max: u32,
}

impl Partition {
    pub fn new(id: u32, nparts: u32, volume_budget: usize) -> Arc<Self> {
        let part_bits = nparts.trailing_zeros();
        Arc::new(Self {
            id,
            nparts,
            part_bits,
            inner: Guarded::new(PartitionInner {
                buckets: vec![NONE; 64],
                nbuckets: 64,
                base: 64,
                entries: EntrySlab::new(),
                free_list: Vec::new(),
                stamp: id as u64,
                flush_stamp: 0,
                clock_hand: 0,
            }),
            volume: AtomicUsize::new(0),
            volume_budget,
            nbuckets_max: 1 << 20,
        })
    }

    pub fn volume(&self) -> usize {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn over_budget(&self, reserve: usize) -> bool {
        self.volume.load(Ordering::Relaxed) + reserve > self.volume_budget
    }

    // -----------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------

    /// Find a live, unexpired entry by key, bumping its CLOCK recency and
    /// returning a reference-counted handle. Lazily unlinks and frees
    /// any expired/flushed entries encountered along the way.
    pub fn lookup(self: &Arc<Self>, hash: u32, key: &[u8]) -> Option<EntryHandle> {
        let now = now_secs();
        let mut guard = self.inner.lock();
        let idx = guard.bucket_index(hash, self.part_bits);
        let mut freed_bytes = 0usize;
        let mut prev = NONE;
        let mut cur = guard.buckets[idx];
        let found = loop {
            if cur == NONE {
                break None;
            }
            let stale = {
                let e = guard.entries.entry(cur);
                e.is_flushed(guard.flush_stamp) || e.is_expired(now)
            };
            let matches = !stale && {
                let e = guard.entries.entry(cur);
                e.hash == hash && e.key() == key
            };
            if stale {
                let next = guard.entries.next(cur);
                let inner = &mut *guard;
                Self::unlink(&mut inner.buckets, &inner.entries, idx, prev, cur, next);
                guard.entries.set_state(cur, State::NotUsed);
                if guard.entries.drop_ref(cur) {
                    freed_bytes += guard.entries.retire(cur);
                    guard.free_list.push(cur);
                }
                cur = next;
                continue;
            }
            if matches {
                guard.entries.add_ref(cur);
                let level = match guard.entries.state(cur) {
                    State::Used(l) => (l + 1).min(USED_MAX),
                    _ => USED_MIN,
                };
                guard.entries.set_state(cur, State::Used(level));
                break Some(cur);
            }
            prev = cur;
            cur = guard.entries.next(cur);
        };
        let handle = found.map(|index| EntryHandle {
            partition: Arc::clone(self),
            index,
            ptr: guard.entries.entry_ptr(index),
        });
        if freed_bytes > 0 {
            self.volume.fetch_sub(freed_bytes, Ordering::Relaxed);
        }
        handle
    }

    /// Splice `cur` out of `bucket`'s chain. When `cur` isn't the head,
    /// the predecessor's `next` link must be repointed at `next` — the
    /// entries slab's atomic `next` field makes that a shared-reference
    /// write, so the caller only needs disjoint borrows of `buckets` and
    /// `entries`, not an exclusive one.
    fn unlink(buckets: &mut [u32], entries: &EntrySlab, bucket: usize, prev: u32, cur: u32, next: u32) {
        if prev == NONE {
            buckets[bucket] = next;
        } else {
            debug_assert_ne!(prev, cur);
            entries.set_next(prev, next);
        }
    }

    // -----------------------------------------------------------------
    // Insert / update / upsert / alter
    // -----------------------------------------------------------------

    /// Allocate a fresh slot and publish `entry` into it, unlinked. The
    /// caller links it via `insert`/`replace_locked` or discards it
    /// (dropping the one implicit reference) if it turns out unneeded.
    fn create(&self, entry: Entry) -> u32 {
        let size = entry.entry_size();
        let mut guard = self.inner.lock();
        // Eviction is driven externally (`evict_round`, called by the
        // server's background fiber whenever a partition is over
        // budget) rather than inline here; `create` just grows.
        let index = guard.free_list.pop().unwrap_or_else(|| guard.entries.reserve_void());
        guard.entries.publish(index, entry, State::NotUsed);
        drop(guard);
        self.volume.fetch_add(size, Ordering::Relaxed);
        index
    }

    pub fn insert(self: &Arc<Self>, key: &[u8], value: &[u8], flags: u32, exp_time_raw: i64, hash: u32) -> InsertOutcome {
        let now = now_secs();
        let exp_time = normalize_exp_time(exp_time_raw, now);
        let mut guard = self.inner.lock();
        let idx = guard.bucket_index(hash, self.part_bits);
        let mut cur = guard.buckets[idx];
        while cur != NONE {
            let e = guard.entries.entry(cur);
            let stale = e.is_flushed(guard.flush_stamp) || e.is_expired(now);
            if !stale && e.hash == hash && e.key() == key {
                guard.entries.add_ref(cur);
                let handle = EntryHandle { partition: Arc::clone(self), index: cur, ptr: guard.entries.entry_ptr(cur) };
                return InsertOutcome::AlreadyExists(handle);
            }
            cur = guard.entries.next(cur);
        }
        let stamp = guard.stamp;
        guard.stamp += self.nparts as u64;
        drop(guard);

        let entry = Entry::new(key, value, flags, exp_time, hash, stamp);
        let index = self.create(entry);
        let mut guard = self.inner.lock();
        let idx = guard.bucket_index(hash, self.part_bits);
        let head = guard.buckets[idx];
        guard.entries.set_next(index, head);
        guard.buckets[idx] = index;
        guard.entries.set_state(index, State::Used(USED_MIN));
        InsertOutcome::Inserted
    }

    /// `update`: replace the entry matching `key` (and `cas` if nonzero)
    /// with a freshly built one carrying a new stamp.
    pub fn update(self: &Arc<Self>, key: &[u8], value: &[u8], flags: u32, exp_time_raw: i64, hash: u32, cas: u64) -> UpdateOutcome {
        let now = now_secs();
        let exp_time = normalize_exp_time(exp_time_raw, now);
        let mut guard = self.inner.lock();
        let idx = guard.bucket_index(hash, self.part_bits);
        let mut prev = NONE;
        let mut cur = guard.buckets[idx];
        loop {
            if cur == NONE {
                return UpdateOutcome::NotFound;
            }
            let (stale, matches, stamp_ok) = {
                let e = guard.entries.entry(cur);
                let stale = e.is_flushed(guard.flush_stamp) || e.is_expired(now);
                let matches = !stale && e.hash == hash && e.key() == key;
                let stamp_ok = cas == 0 || e.stamp == cas;
                (stale, matches, stamp_ok)
            };
            if stale {
                let next = guard.entries.next(cur);
                let inner = &mut *guard;
                Self::unlink(&mut inner.buckets, &inner.entries, idx, prev, cur, next);
                guard.entries.set_state(cur, State::NotUsed);
                if guard.entries.drop_ref(cur) {
                    let freed = guard.entries.retire(cur);
                    guard.free_list.push(cur);
                    self.volume.fetch_sub(freed, Ordering::Relaxed);
                }
                cur = next;
                continue;
            }
            if matches {
                if !stamp_ok {
                    guard.entries.add_ref(cur);
                    let handle = EntryHandle { partition: Arc::clone(self), index: cur, ptr: guard.entries.entry_ptr(cur) };
                    return UpdateOutcome::CasMismatch(handle);
                }
                let next = guard.entries.next(cur);
                let stamp = guard.stamp;
                guard.stamp += self.nparts as u64;
                let inner = &mut *guard;
                Self::unlink(&mut inner.buckets, &inner.entries, idx, prev, cur, next);
                guard.entries.set_state(cur, State::NotUsed);
                let was_last = guard.entries.drop_ref(cur);
                if was_last {
                    let freed = guard.entries.retire(cur);
                    guard.free_list.push(cur);
                    self.volume.fetch_sub(freed, Ordering::Relaxed);
                }
                drop(guard);

                let entry = Entry::new(key, value, flags, exp_time, hash, stamp);
                let new_index = self.create(entry);
                let mut guard2 = self.inner.lock();
                let idx2 = guard2.bucket_index(hash, self.part_bits);
                let head = guard2.buckets[idx2];
                guard2.entries.set_next(new_index, head);
                guard2.buckets[idx2] = new_index;
                guard2.entries.set_state(new_index, State::Used(USED_MIN));
                return UpdateOutcome::Replaced;
            }
            prev = cur;
            cur = guard.entries.next(cur);
        }
    }

    /// `upsert` = `update` with `cas = 0`, falling back to `insert` when
    /// nothing matched.
    pub fn upsert(self: &Arc<Self>, key: &[u8], value: &[u8], flags: u32, exp_time_raw: i64, hash: u32) {
        match self.update(key, value, flags, exp_time_raw, hash, 0) {
            UpdateOutcome::Replaced | UpdateOutcome::CasMismatch(_) => {}
            UpdateOutcome::NotFound => {
                self.insert(key, value, flags, exp_time_raw, hash);
            }
        }
    }

    /// `alter`: append/prepend/incr/decr worker. Caller supplies the
    /// fully-formed replacement value and the CAS stamp it read the old
    /// value under; on `CasMismatch` the caller re-reads and retries.
    pub fn alter(self: &Arc<Self>, key: &[u8], value: &[u8], flags: u32, exp_time_raw: i64, hash: u32, cas: u64) -> UpdateOutcome {
        self.update(key, value, flags, exp_time_raw, hash, cas)
    }

    /// `delete`: unlink the matching entry if present.
    pub fn delete(self: &Arc<Self>, hash: u32, key: &[u8]) -> bool {
        let now = now_secs();
        let mut guard = self.inner.lock();
        let idx = guard.bucket_index(hash, self.part_bits);
        let mut prev = NONE;
        let mut cur = guard.buckets[idx];
        while cur != NONE {
            let (stale, matches) = {
                let e = guard.entries.entry(cur);
                let stale = e.is_flushed(guard.flush_stamp) || e.is_expired(now);
                (stale, !stale && e.hash == hash && e.key() == key)
            };
            let next = guard.entries.next(cur);
            if stale || matches {
                let inner = &mut *guard;
                Self::unlink(&mut inner.buckets, &inner.entries, idx, prev, cur, next);
                guard.entries.set_state(cur, State::NotUsed);
                if guard.entries.drop_ref(cur) {
                    let freed = guard.entries.retire(cur);
                    guard.free_list.push(cur);
                    self.volume.fetch_sub(freed, Ordering::Relaxed);
                }
                if matches {
                    return true;
                }
                cur = next;
                continue;
            }
            prev = cur;
            cur = next;
        }
        false
    }

    pub fn flush_all(&self) {
        let mut guard = self.inner.lock();
        guard.flush_stamp = guard.stamp;
    }

    // -----------------------------------------------------------------
    // Eviction — CLOCK + volume (§4.E)
    // -----------------------------------------------------------------

    /// Run one round of CLOCK eviction. Returns bytes freed; `0` means
    /// nothing could be reclaimed this round (caller should stop to
    /// avoid livelock per spec's fairness note).
    pub fn evict_round(&self) -> usize {
        let now = now_secs();
        let mut guard = self.inner.lock();
        let total_slots = guard.entries.len();
        if total_slots == 0 {
            return 0;
        }
        let mut swept = 0u32;
        let mut freed = 0usize;
        let start = guard.clock_hand;
        loop {
            if swept >= total_slots.min(EVICT_SWEEP_MAX) {
                break;
            }
            let index = guard.clock_hand;
            guard.clock_hand = (guard.clock_hand + 1) % total_slots;
            swept += 1;
            match guard.entries.state(index) {
                State::Used(level) => {
                    let e = guard.entries.entry(index);
                    let expired = e.is_flushed(guard.flush_stamp) || e.is_expired(now);
                    if expired || level == USED_MIN {
                        let bucket = guard.bucket_index(guard.entries.entry(index).hash, self.part_bits);
                        let (prev, next) = Self::find_in_chain(&guard, bucket, index);
                        let inner = &mut *guard;
                        Self::unlink(&mut inner.buckets, &inner.entries, bucket, prev, index, next);
                        guard.entries.set_state(index, State::NotUsed);
                        if guard.entries.drop_ref(index) {
                            freed += guard.entries.retire(index);
                            guard.free_list.push(index);
                        }
                        if guard.clock_hand == start {
                            break;
                        }
                    } else {
                        guard.entries.set_state(index, State::Used(level - 1));
                    }
                }
                _ => {}
            }
            if guard.clock_hand == start {
                break;
            }
        }
        if freed > 0 {
            self.volume.fetch_sub(freed, Ordering::Relaxed);
        }
        freed
    }

    fn find_in_chain(guard: &PartitionInner, bucket: usize, target: u32) -> (u32, u32) {
        let mut prev = NONE;
        let mut cur = guard.buckets[bucket];
        while cur != NONE {
            let next = guard.entries.next(cur);
            if cur == target {
                return (prev, next);
            }
            prev = cur;
            cur = next;
        }
        (NONE, NONE)
    }

    // -----------------------------------------------------------------
    // Incremental resize ("stride") — §4.E
    // -----------------------------------------------------------------

    /// Run one stride of incremental bucket resize. Splits up to
    /// `STRIDE_SIZE` not-yet-split source chains (`split..split+stride`
    /// within `0..base`) into their paired target buckets
    /// (`base+split..base+split+stride`) against the round's fixed
    /// `2 * base` modulus, then advances `nbuckets` by the stride. Once
    /// `nbuckets` reaches `2 * base`, `base` doubles and the next call
    /// starts a fresh round. Returns `true` if resize work remains
    /// (caller should reschedule another round).
    pub fn resize_step(&self) -> bool {
        let mut guard = self.inner.lock();
        let nentries = guard.entries.len();
        if (nentries as u64) <= 2 * guard.nbuckets as u64 || guard.nbuckets >= self.nbuckets_max {
            return false;
        }
        let base = guard.base;
        let split = guard.nbuckets - base;
        if split == 0 {
            let new_len = (base as usize) * 2;
            if guard.buckets.len() < new_len {
                guard.buckets.resize(new_len, NONE);
            }
        }
        let stride = STRIDE_SIZE.min(base - split);
        let modulus = 2 * base as usize;
        for offset in 0..stride {
            let source = (split + offset) as usize;
            let target = (base + split + offset) as usize;
            let mut source_head = NONE;
            let mut target_head = NONE;
            let mut cur = guard.buckets[source];
            while cur != NONE {
                let next = guard.entries.next(cur);
                let hash = guard.entries.entry(cur).hash;
                let full_idx = (hash as usize >> self.part_bits) % modulus;
                if full_idx == target {
                    guard.entries.set_next(cur, target_head);
                    target_head = cur;
                } else {
                    guard.entries.set_next(cur, source_head);
                    source_head = cur;
                }
                cur = next;
            }
            guard.buckets[source] = source_head;
            guard.buckets[target] = target_head;
        }
        guard.nbuckets += stride;
        if guard.nbuckets == base * 2 {
            guard.base = base * 2;
        }
        true
    }

    pub fn nbuckets(&self) -> u32 {
        self.inner.lock().nbuckets
    }

    pub fn nentries(&self) -> u32 {
        self.inner.lock().entries.len()
    }

    pub fn part_bits(&self) -> u32 {
        self.part_bits
    }
}

/// A reference-counted, splice-friendly handle onto a live `Entry`.
/// Dropping it releases the reference; if that was the last one and the
/// entry is already unlinked, the slot is torn down and returned to the
/// partition's free list.
pub struct EntryHandle {
    partition: Arc<Partition>,
    index: u32,
    ptr: *const Entry,
}

unsafe impl Send for EntryHandle {}

impl Deref for EntryHandle {
    type Target = Entry;
    fn deref(&self) -> &Entry {
        unsafe { &*self.ptr }
    }
}

impl Clone for EntryHandle {
    fn clone(&self) -> Self {
        let mut guard = self.partition.inner.lock();
        guard.entries.add_ref(self.index);
        drop(guard);
        EntryHandle { partition: Arc::clone(&self.partition), index: self.index, ptr: self.ptr }
    }
}

impl Drop for EntryHandle {
    fn drop(&mut self) {
        let mut guard = self.partition.inner.lock();
        if guard.entries.drop_ref(self.index) {
            let freed = guard.entries.retire(self.index);
            guard.free_list.push(self.index);
            drop(guard);
            self.partition.volume.fetch_sub(freed, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::hash::hash_key;

    fn part() -> Arc<Partition> {
        Partition::new(0, 1, 1 << 20)
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let p = part();
        let h = hash_key(b"foo");
        p.insert(b"foo", b"bar", 0, 0, h);
        let got = p.lookup(h, b"foo").expect("present");
        assert_eq!(got.value(), b"bar");
    }

    #[test]
    fn lookup_miss_returns_none() {
        let p = part();
        assert!(p.lookup(hash_key(b"nope"), b"nope").is_none());
    }

    #[test]
    fn update_replaces_value_and_advances_stamp() {
        let p = part();
        let h = hash_key(b"k");
        p.insert(b"k", b"1", 0, 0, h);
        let stamp1 = p.lookup(h, b"k").unwrap().stamp;
        p.upsert(b"k", b"2", 0, 0, h);
        let got = p.lookup(h, b"k").unwrap();
        assert_eq!(got.value(), b"2");
        assert!(got.stamp > stamp1);
    }

    #[test]
    fn cas_mismatch_reports_existing_value() {
        let p = part();
        let h = hash_key(b"k");
        p.insert(b"k", b"A", 0, 0, h);
        let wrong_cas = 999999;
        match p.update(b"k", b"B", 0, 0, h, wrong_cas) {
            UpdateOutcome::CasMismatch(handle) => assert_eq!(handle.value(), b"A"),
            _ => panic!("expected CasMismatch"),
        }
        assert_eq!(p.lookup(h, b"k").unwrap().value(), b"A");
    }

    #[test]
    fn delete_removes_entry() {
        let p = part();
        let h = hash_key(b"k");
        p.insert(b"k", b"v", 0, 0, h);
        assert!(p.delete(h, b"k"));
        assert!(p.lookup(h, b"k").is_none());
    }

    #[test]
    fn flush_all_hides_prior_entries() {
        let p = part();
        let h = hash_key(b"k");
        p.insert(b"k", b"v", 0, 0, h);
        p.flush_all();
        assert!(p.lookup(h, b"k").is_none());
    }

    #[test]
    fn expired_entry_is_lazily_reclaimed() {
        let p = part();
        let h = hash_key(b"k");
        p.insert(b"k", b"v", 0, -1, h); // already expired
        assert!(p.lookup(h, b"k").is_none());
    }

    #[test]
    fn volume_tracks_live_entries() {
        let p = part();
        let h = hash_key(b"k");
        assert_eq!(p.volume(), 0);
        p.insert(b"k", b"v", 0, 0, h);
        assert!(p.volume() > 0);
        p.delete(h, b"k");
        assert_eq!(p.volume(), 0);
    }

    #[test]
    fn delete_of_non_head_chain_entry_preserves_sibling() {
        let p = part();
        // With a freshly built partition (nbuckets == base == 64, part_bits
        // == 0), raw hashes 5 and 5 + 64 fold to the same bucket 5.
        let h_a = 5u32;
        let h_b = 5u32 + 64;
        p.insert(b"a", b"A", 0, 0, h_a);
        p.insert(b"b", b"B", 0, 0, h_b); // "b" lands at the chain head, "a" behind it
        assert!(p.delete(h_a, b"a"));
        assert!(p.lookup(h_a, b"a").is_none());
        let got = p.lookup(h_b, b"b").expect("head sibling must stay reachable once its non-head predecessor is unlinked");
        assert_eq!(got.value(), b"B");
    }

    #[test]
    fn update_of_non_head_chain_entry_preserves_sibling() {
        let p = part();
        let h_a = 5u32;
        let h_b = 5u32 + 64;
        p.insert(b"a", b"A", 0, 0, h_a);
        p.insert(b"b", b"B", 0, 0, h_b);
        p.upsert(b"a", b"A2", 0, 0, h_a);
        assert_eq!(p.lookup(h_a, b"a").unwrap().value(), b"A2");
        assert_eq!(p.lookup(h_b, b"b").unwrap().value(), b"B");
    }

    #[test]
    fn resize_step_keeps_keys_reachable_across_incremental_splits() {
        let p = Partition::new(0, 1, usize::MAX);
        let n = 2000u32;
        for i in 0..n {
            let key = format!("key-{i}");
            let h = hash_key(key.as_bytes());
            p.insert(key.as_bytes(), b"v", 0, 0, h);
        }
        for _ in 0..64 {
            if !p.resize_step() {
                break;
            }
        }
        assert!(p.nbuckets() > 64, "resize should have grown the bucket array");
        for i in 0..n {
            let key = format!("key-{i}");
            let h = hash_key(key.as_bytes());
            assert!(p.lookup(h, key.as_bytes()).is_some(), "key {key} should remain reachable after incremental resize");
        }
    }

    #[test]
    fn eviction_reclaims_cold_entries_under_pressure() {
        let p = Partition::new(0, 1, 4096);
        for i in 0..200u32 {
            let key = format!("key-{i}");
            let h = hash_key(key.as_bytes());
            p.insert(key.as_bytes(), &[0u8; 64], 0, 0, h);
            if p.over_budget(0) {
                p.evict_round();
            }
        }
        assert!(p.volume() <= 4096 + 256);
    }
}
