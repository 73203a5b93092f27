//! Cooperative fiber runtime (component C): saved-context stack
//! switching, a priority run-queue, wait-sets and a timer queue
//! (spec.md §4.C).

pub mod context;
pub mod strand;
pub mod timerqueue;
pub mod waitset;

pub use strand::{FiberId, Strand};
pub use waitset::{UniqueWaiter, WaitSet};
