//! Free-running counters queried by the memcached `stats` command
//! (SPEC_FULL.md §3 EXPANSION, supplemented from
//! `original_source/`'s `core/core.h` per-core stats block). spec.md §6
//! keeps the wire reply `END\r\n`-only; these counters back `debug!`
//! tracing spans and the `Table::stats()` test accessor, not the reply
//! body itself.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct TableStats {
    pub cmd_get: AtomicU64,
    pub cmd_set: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub expired_unfetched: AtomicU64,
    pub evictions: AtomicU64,
}

impl TableStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self, hit: bool) {
        self.cmd_get.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.get_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.get_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_set(&self, bytes: u64) {
        self.cmd_set.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TableStatsSnapshot {
        TableStatsSnapshot {
            cmd_get: self.cmd_get.load(Ordering::Relaxed),
            cmd_set: self.cmd_set.load(Ordering::Relaxed),
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            expired_unfetched: self.expired_unfetched.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStatsSnapshot {
    pub cmd_get: u64,
    pub cmd_set: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub expired_unfetched: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = TableStats::new();
        stats.record_get(true);
        stats.record_get(false);
        stats.record_set(10);
        let snap = stats.snapshot();
        assert_eq!(snap.cmd_get, 2);
        assert_eq!(snap.get_hits, 1);
        assert_eq!(snap.get_misses, 1);
        assert_eq!(snap.bytes_written, 10);
    }
}
