//! Lock-free and data-structure building blocks shared by every other
//! component: the atomics vocabulary, adaptive back-off, intrusive lists,
//! and the MPMC/MPSC ring used both for cross-thread request queues and the
//! combiner's hand-off protocol.

pub mod atomic;
pub mod backoff;
pub mod intrusive;
pub mod ring;
pub mod rwlock;
pub mod spinlock;

pub use backoff::Backoff;
pub use rwlock::RwLock;
pub use spinlock::{Guarded, RawLock, SpinLock, TicketLock};
