//! Performance benchmarks for ledger-kit
//!
//! This benchmark suite measures:
//! - Summary derivation over growing ledgers
//! - Snapshot decoding (normalize) with the owner filter
//! - InMemory store writes (set, batched update)
//! - Rate cache lookups
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ledger_kit::auth::Principal;
use ledger_kit::currency::{RateCache, RateKey};
use ledger_kit::observability::TtlPolicy;
use ledger_kit::store::{InMemoryStore, RemoteStore};
use ledger_kit::sync::normalize;
use ledger_kit::{CurrencyCode, LineItem, OrderSummary, SyncOptions, SyncRecord};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::hint::black_box;

// ============================================================================
// Benchmark Fixtures
// ============================================================================

fn items(count: usize) -> Vec<LineItem> {
    let stamp = NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid stamp");
    (0..count)
        .map(|n| {
            let currency = if n % 3 == 0 { CurrencyCode::eur() } else { CurrencyCode::czk() };
            LineItem::new(&format!("Item {}", n), 10.0 + n as f64, currency, "Cafe", stamp)
                .expect("valid item")
                .with_quantity((n % 4) as u32 + 1, stamp)
                .with_owner(if n % 2 == 0 { "alice" } else { "bob" }.to_string())
        })
        .collect()
}

fn snapshot(items: &[LineItem]) -> Value {
    let map: Map<String, Value> = items
        .iter()
        .enumerate()
        .map(|(n, item)| (format!("k{}", n), item.to_store_value().expect("serializable")))
        .collect();
    Value::Object(map)
}

// ============================================================================
// Group 1: Ledger Derivation
// ============================================================================

fn ledger_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");
    let alice = Principal::new("alice");
    let options = SyncOptions::<LineItem>::new("orderItems");

    for size in [10, 100, 1_000].iter() {
        let items = items(*size);
        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("summary", size), &items, |b, items| {
                b.iter(|| OrderSummary::derive(black_box(items), None));
            });

        let raw = snapshot(&items);
        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("normalize", size), &raw, |b, raw| {
                b.iter(|| {
                    normalize::<LineItem>("orderItems", black_box(raw.clone()), Some(&alice), &options)
                });
            });
    }

    group.finish();
}

// ============================================================================
// Group 2: InMemory Store Writes
// ============================================================================

fn store_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_store");

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");

    group.bench_function("set", |b| {
        let store = InMemoryStore::new();
        let body = json!({"itemName": "Coffee", "itemInitialPrice": 50.0});
        b.to_async(&rt).iter(|| async {
            store
                .set(black_box("orderItems/k1"), black_box(body.clone()))
                .await
                .expect("Failed to set")
        });
    });

    for size in [2, 20, 200].iter() {
        group
            .throughput(Throughput::Elements(*size as u64))
            .bench_with_input(BenchmarkId::new("batch_update", size), size, |b, &size| {
                let store = InMemoryStore::new();
                let updates: BTreeMap<String, Value> = (0..size)
                    .map(|n| (format!("orderItems/k{}/billLocation", n), json!("Cafe X")))
                    .collect();
                b.to_async(&rt).iter(|| async {
                    store
                        .update(black_box(updates.clone()))
                        .await
                        .expect("Failed to update")
                });
            });
    }

    group.finish();
}

// ============================================================================
// Group 3: Rate Cache
// ============================================================================

fn rate_cache_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_cache");
    let cache = RateCache::new(TtlPolicy::default());
    let key = RateKey::new(CurrencyCode::eur(), CurrencyCode::czk());
    cache.insert(key.clone(), 25.0);
    let missing = RateKey::new(CurrencyCode::czk(), CurrencyCode::eur());

    group.bench_function("get_valid_hit", |b| {
        b.iter(|| cache.get_valid(black_box(&key)));
    });

    group.bench_function("get_valid_miss", |b| {
        b.iter(|| cache.get_valid(black_box(&missing)));
    });

    group.finish();
}

// ============================================================================
// Benchmark Registration
// ============================================================================

criterion_group!(
    benches,
    ledger_benchmarks,
    store_benchmarks,
    rate_cache_benchmarks
);
criterion_main!(benches);
