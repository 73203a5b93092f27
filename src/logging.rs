//! `tracing` init (SPEC_FULL.md §4.L). Mirrors `original_source/src/base/log/log.c`'s
//! level taxonomy (debug, info, warning, error, fatal) collapsed onto
//! `tracing`'s five levels: partition eviction and stride-resize log at
//! `debug!`, session-trash events at `warn!`.

use tracing_subscriber::EnvFilter;

/// Initialise the global `tracing` subscriber from `RUST_LOG`, defaulting
/// to `info` when unset. Call once from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
