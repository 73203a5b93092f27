//! The table: a fixed set of partitions chosen at start-up (spec.md §3
//! "Table"). Routing itself (direct/delegate/combine) lives in
//! `crate::dispatch`; this module only owns the partitions and the
//! hash-to-partition-id split described in §4.E "Routing modes".

use std::sync::Arc;

use super::hash::hash_key;
use super::partition::Partition;
use super::stats::{TableStats, TableStatsSnapshot};

pub struct TableConfig {
    pub nparts: u32,
    pub volume_budget_total: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { nparts: 1, volume_budget_total: 64 << 20 }
    }
}

/// Owns every partition. `part_bits` low bits of a key's hash select the
/// partition; the remaining upper bits index that partition's buckets.
pub struct Table {
    partitions: Vec<Arc<Partition>>,
    part_bits: u32,
    stats: TableStats,
}

impl Table {
    pub fn new(config: TableConfig) -> Self {
        let nparts = config.nparts.next_power_of_two().max(1);
        let part_bits = nparts.trailing_zeros();
        let per_partition_budget = (config.volume_budget_total / nparts as usize).max(1);
        let partitions = (0..nparts)
            .map(|id| Partition::new(id, nparts, per_partition_budget))
            .collect();
        Self { partitions, part_bits, stats: TableStats::new() }
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> TableStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn nparts(&self) -> u32 {
        self.partitions.len() as u32
    }

    pub fn part_bits(&self) -> u32 {
        self.part_bits
    }

    pub fn hash_key(&self, key: &[u8]) -> u32 {
        hash_key(key)
    }

    /// The partition id a hash routes to — the low `part_bits` bits.
    pub fn partition_id(&self, hash: u32) -> u32 {
        hash & (self.partitions.len() as u32 - 1)
    }

    pub fn partition(&self, id: u32) -> &Arc<Partition> {
        &self.partitions[id as usize]
    }

    pub fn partition_for_key(&self, key: &[u8]) -> (u32, &Arc<Partition>) {
        let hash = self.hash_key(key);
        let id = self.partition_id(hash);
        (hash, self.partition(id))
    }

    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    /// Aggregate live volume across every partition (for `stats`).
    pub fn total_volume(&self) -> usize {
        self.partitions.iter().map(|p| p.volume()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hash_routes_to_its_low_bits_partition() {
        let table = Table::new(TableConfig { nparts: 8, volume_budget_total: 1 << 20 });
        for h in [0u32, 1, 7, 8, 255, 1_000_003] {
            let id = table.partition_id(h);
            assert_eq!(h % table.nparts(), id);
        }
    }

    #[test]
    fn insert_and_lookup_via_table_routing() {
        let table = Table::new(TableConfig { nparts: 4, volume_budget_total: 1 << 20 });
        let (hash, part) = table.partition_for_key(b"hello");
        part.insert(b"hello", b"world", 0, 0, hash);
        let (hash2, part2) = table.partition_for_key(b"hello");
        assert_eq!(hash, hash2);
        assert_eq!(part2.lookup(hash2, b"hello").unwrap().value(), b"world");
    }
}
