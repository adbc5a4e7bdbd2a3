//! Performance benchmarks for entity-kit
//!
//! This benchmark suite measures:
//! - EntityStore lookups (cache hit, fetch after invalidate)
//! - BatchResolver throughput across batch sizes, cold and warm
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use entity_kit::transport::{MemoryTransport, Reply};
use entity_kit::{BatchResolver, Entity, EntityStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::hint::black_box;

// ============================================================================
// Benchmark Test Fixtures
// ============================================================================

#[derive(Clone, Serialize, Deserialize)]
struct BenchEntity {
    id: u64,
    name: String,
    tags: Vec<String>,
}

impl Entity for BenchEntity {
    type Key = u64;

    fn entity_key(&self) -> Self::Key {
        self.id
    }

    fn resource() -> &'static str {
        "bench"
    }
}

fn transport_with(count: u64) -> MemoryTransport {
    let transport = MemoryTransport::new();
    for id in 0..count {
        transport.on_get(
            format!("bench/{}", id),
            Reply::json(json!({
                "name": format!("entity-{}", id),
                "tags": ["a", "b", "c"],
            })),
        );
    }
    transport
}

// ============================================================================
// EntityStore Benchmarks
// ============================================================================

fn store_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_store");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    group.bench_function("get_hit", |b| {
        let store: EntityStore<BenchEntity, _> = EntityStore::new(transport_with(1));
        rt.block_on(async {
            store.get(&0).await.expect("Failed to get");
        });

        b.to_async(&rt).iter(|| async { store.get(black_box(&0)).await });
    });

    group.bench_function("get_after_invalidate", |b| {
        let store: EntityStore<BenchEntity, _> = EntityStore::new(transport_with(1));

        b.to_async(&rt).iter(|| async {
            store.invalidate(&0);
            store.get(black_box(&0)).await
        });
    });

    group.bench_function("peek", |b| {
        let store: EntityStore<BenchEntity, _> = EntityStore::new(transport_with(1));
        rt.block_on(async {
            store.get(&0).await.expect("Failed to get");
        });

        b.iter(|| store.peek(black_box(&0)));
    });

    group.finish();
}

// ============================================================================
// BatchResolver Benchmarks
// ============================================================================

fn batch_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_resolver");
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    for size in [10u64, 100, 1_000].iter() {
        let ids: Vec<u64> = (0..*size).collect();

        group
            .throughput(Throughput::Elements(*size))
            .bench_with_input(BenchmarkId::new("resolve_cold", size), &ids, |b, ids| {
                let transport = transport_with(*size);

                b.to_async(&rt).iter(|| {
                    let resolver: BatchResolver<BenchEntity, _> =
                        BatchResolver::new(EntityStore::new(transport.clone()));
                    async move { resolver.resolve_many(black_box(ids)).await }
                });
            });

        group
            .throughput(Throughput::Elements(*size))
            .bench_with_input(BenchmarkId::new("resolve_warm", size), &ids, |b, ids| {
                let resolver: BatchResolver<BenchEntity, _> =
                    BatchResolver::new(EntityStore::new(transport_with(*size)));
                rt.block_on(async {
                    resolver.resolve_many(ids).await;
                });

                b.to_async(&rt)
                    .iter(|| async { resolver.resolve_many(black_box(ids)).await });
            });
    }

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(benches, store_benchmarks, batch_benchmarks);
criterion_main!(benches);
