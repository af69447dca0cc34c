use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use pagemark_core::ordering::renumber;
use pagemark_core::{
    cascade_delete, fields, recompute_visible_positions, sync_page_markers, ChildLink, DocRef,
    DocumentStore, MarkerScope, MemoryStore, Scope, WriteBatch,
};

const SIZES: &[usize] = &[100, 1_000, 5_000];

/// Scope of `count` products whose `order` values are spread out, so renumbering rewrites
/// every one of them.
fn sparse_scope(count: usize) -> MemoryStore {
    let mut store = MemoryStore::with_max_batch_ops(usize::MAX);
    let mut batch = WriteBatch::new();
    batch.create("categories", &"drinks".into(), fields! { "order" => 0 });
    for i in 0..count {
        batch.create(
            "products",
            &format!("p{i:06}").into(),
            fields! { "category" => "drinks", "order" => i * 3, "visible" => i % 4 != 0 },
        );
    }
    store.commit(batch).unwrap();
    store
}

fn bench_renumber(c: &mut Criterion) {
    let scope = Scope::child("products", "category", "drinks");
    let mut group = c.benchmark_group("renumber");
    for &count in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || sparse_scope(count),
                |mut store| renumber(&mut store, &scope).unwrap(),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_repaginate(c: &mut Criterion) {
    let scope = Scope::child("products", "category", "drinks");
    let markers = MarkerScope::scoped("product_pages", "category", "drinks");
    let mut group = c.benchmark_group("repaginate");
    for &count in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || sparse_scope(count),
                |mut store| {
                    let visible = recompute_visible_positions(&mut store, &scope, 6).unwrap();
                    sync_page_markers(&mut store, &markers, visible, 6).unwrap()
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_cascade_delete(c: &mut Criterion) {
    let links = [ChildLink::new("products", "category")];
    let parent = DocRef::new("categories", "drinks");
    let mut group = c.benchmark_group("cascade_delete");
    for &count in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || sparse_scope(count),
                |mut store| {
                    let report = cascade_delete(&mut store, &parent, &links, 400).unwrap();
                    assert!(store.get("categories", &parent.id).unwrap().is_none());
                    report
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_renumber, bench_repaginate, bench_cascade_delete);
criterion_main!(benches);
