//! A minimal atomics vocabulary.
//!
//! Every concurrent structure in this crate is built from these handful of
//! operations; callers cite the ordering they need at the call site rather
//! than picking a `std::sync::atomic::Ordering` ad hoc. "Relaxed" means no
//! ordering beyond the atomicity of the access itself; "acquire"/"release"
//! pair the load of a published value with the store that published it.

use std::sync::atomic::{fence, Ordering};

/// Acquire-release load: pairs with a `store_release` elsewhere.
#[inline(always)]
pub fn load_acquire<T: Copy>(cell: &impl LoadStore<T>) -> T {
    cell.load(Ordering::Acquire)
}

/// Release store: publishes a value that a subsequent `load_acquire`
/// elsewhere will observe along with everything written before this call.
#[inline(always)]
pub fn store_release<T>(cell: &impl LoadStore<T>, val: T) {
    cell.store(val, Ordering::Release)
}

/// A full bidirectional fence: no load or store may cross it in either
/// direction. Used sparingly — e.g. the event listener's publish-state /
/// re-check-inbox dance before parking (§4.D notify protocol).
#[inline(always)]
pub fn full_fence() {
    fence(Ordering::SeqCst);
}

/// A fence that orders prior stores before the fence against later loads
/// after it, without itself being an atomic access. Used by the back-off
/// loop to get a release-like barrier without a redundant store.
#[inline(always)]
pub fn store_fence() {
    fence(Ordering::Release);
}

/// A fence ordering prior loads against following operations.
#[inline(always)]
pub fn load_fence() {
    fence(Ordering::Acquire);
}

/// Narrow trait so `load_acquire`/`store_release` can be written generically
/// over `AtomicU32`, `AtomicU64`, `AtomicUsize`, etc. without macro
/// duplication at every call site.
pub trait LoadStore<T> {
    fn load(&self, order: Ordering) -> T;
    fn store(&self, val: T, order: Ordering);
}

macro_rules! impl_load_store {
    ($atomic:ty, $inner:ty) => {
        impl LoadStore<$inner> for $atomic {
            #[inline(always)]
            fn load(&self, order: Ordering) -> $inner {
                <$atomic>::load(self, order)
            }
            #[inline(always)]
            fn store(&self, val: $inner, order: Ordering) {
                <$atomic>::store(self, val, order)
            }
        }
    };
}

impl_load_store!(std::sync::atomic::AtomicU32, u32);
impl_load_store!(std::sync::atomic::AtomicU64, u64);
impl_load_store!(std::sync::atomic::AtomicUsize, usize);
impl_load_store!(std::sync::atomic::AtomicBool, bool);

/// `fetch_add` that also reports whether the resulting count is zero —
/// the shape every `ref_count`/`dec_and_test` drop path needs without
/// re-loading the atomic.
#[inline(always)]
pub fn dec_and_test(counter: &std::sync::atomic::AtomicU32) -> bool {
    counter.fetch_sub(1, Ordering::AcqRel) == 1
}

/// `fetch_add` reporting whether the count transitioned away from zero
/// (i.e. this caller is the first referent).
#[inline(always)]
pub fn inc_and_test(counter: &std::sync::atomic::AtomicU32) -> bool {
    counter.fetch_add(1, Ordering::AcqRel) == 0
}
