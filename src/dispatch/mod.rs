//! Action dispatch layer (component F): the three routing modes for
//! table operations (spec.md §4.E "Routing modes", §4.F).

pub mod combiner;
pub mod future;
pub mod mode;
pub mod router;

pub use mode::DispatchMode;
pub use router::PartitionRoute;
