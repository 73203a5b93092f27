//! Event listener & dispatcher (spec.md §4.D): per-thread poll backend,
//! cross-thread notify protocol, and epoch-based sink reclamation.

pub mod backend;
pub mod epoch;
pub mod inbox;
pub mod listener;
pub mod sink;

pub use backend::{Backend, DefaultBackend, ReadyEvent};
pub use epoch::{EpochParticipant, GlobalEpoch};
pub use inbox::{Inbox, Job};
pub use listener::{Listener, ListenerState, WakeAction};
pub use sink::{Readiness, Sink, SinkFlags};
