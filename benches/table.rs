// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Partition table benchmarks.
//
// Run with:
//   cargo bench --bench table
//
// Groups:
//   insert        — fresh-key insert throughput at three value sizes
//   lookup_hit    — lookup of a key already resident
//   lookup_miss   — lookup of a key never inserted
//   evict_round   — one CLOCK sweep under volume pressure

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mainmemory::table::hash::hash_key;
use mainmemory::table::partition::Partition;

const SIZES: &[(&str, usize)] = &[("small_16", 16), ("medium_256", 256), ("large_4096", 4096)];

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let part = Partition::new(0, 1, 256 << 20);
            let value = vec![0xABu8; sz];
            let mut i: u64 = 0;
            b.iter(|| {
                let key = format!("key-{i}");
                let hash = hash_key(key.as_bytes());
                part.insert(key.as_bytes(), &value, 0, 0, hash);
                i += 1;
                black_box(i);
            });
        });
    }

    group.finish();
}

fn bench_lookup_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hit");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let part = Partition::new(0, 1, 256 << 20);
            let value = vec![0xABu8; sz];
            let hash = hash_key(b"resident");
            part.insert(b"resident", &value, 0, 0, hash);
            b.iter(|| {
                let handle = part.lookup(hash, b"resident");
                black_box(handle.map(|h| h.value().len()));
            });
        });
    }

    group.finish();
}

fn bench_lookup_miss(c: &mut Criterion) {
    let part = Partition::new(0, 1, 256 << 20);
    let hash = hash_key(b"absent");
    c.bench_function("lookup_miss", |b| {
        b.iter(|| black_box(part.lookup(hash, b"absent")));
    });
}

fn bench_evict_round(c: &mut Criterion) {
    c.bench_function("evict_round", |b| {
        b.iter_batched(
            || {
                // Volume budget small enough that a full population run leaves
                // the partition over budget, so each timed round has real work.
                let part = Partition::new(0, 1, 64 << 10);
                for i in 0..4096u64 {
                    let key = format!("evict-key-{i}");
                    let hash = hash_key(key.as_bytes());
                    part.insert(key.as_bytes(), &[0xCDu8; 128], 0, 0, hash);
                }
                part
            },
            |part| black_box(part.evict_round()),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_insert, bench_lookup_hit, bench_lookup_miss, bench_evict_round);
criterion_main!(benches);
