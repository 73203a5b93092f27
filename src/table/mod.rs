//! The partitioned cache table (component E): buckets, entries, CLOCK
//! hand, incremental stride resize, volume-driven eviction (spec.md §3,
//! §4.E).

pub mod entry;
pub mod hash;
pub mod partition;
pub mod slab;
pub mod stats;
pub mod table;

pub use entry::{Entry, State};
pub use hash::hash_key;
pub use partition::{EntryHandle, InsertOutcome, Partition, UpdateOutcome};
pub use stats::{TableStats, TableStatsSnapshot};
pub use table::{Table, TableConfig};
