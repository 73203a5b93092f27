//! Per-thread memory arenas and chunked I/O buffers (component B).

pub mod arena;
pub mod buffer;

pub use arena::{Arena, SegmentPool};
pub use buffer::Buffer;
