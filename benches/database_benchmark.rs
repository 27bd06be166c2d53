use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use recordkeep::core::read_version_cache::ReadVersionCache;
use recordkeep::core::transaction::TransactionRunner;
use recordkeep::core::types::{DocId, FieldValue, Item, ItemType};
use recordkeep::index::maintainer::MaintainerRegistry;
use recordkeep::index::scalar::ScalarMaintainer;
use recordkeep::kv::memory::MemoryDatabase;
use recordkeep::kv::Database;
use recordkeep::query::ast::{Predicate, Query};
use recordkeep::query::memo::{AvailableIndex, PlanningContext};
use recordkeep::query::{optimize, OptimizerLimits, Statistics};
use recordkeep::storage::serializer::TransformingSerializer;
use recordkeep::storage::store::{AllowAll, AuthContext, ItemStore};

fn build_store() -> ItemStore {
    let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let runner = Arc::new(TransactionRunner::new(db.clone(), Arc::new(ReadVersionCache::new(64))));
    let store = ItemStore::new(db, runner, TransformingSerializer::plain(), 64 * 1024, Arc::new(AllowAll));

    let widget_type = ItemType {
        name: "widget".to_string(),
        primary_key_fields: vec!["sku".to_string()],
        indexes: Vec::new(),
        relationships: Vec::new(),
        path_template: Vec::new(),
    };
    let mut registry = MaintainerRegistry::new();
    registry.register(Arc::new(ScalarMaintainer::new("by_sku", "sku", true)));
    store.register_type(widget_type, registry);
    store
}

fn item(id: u64) -> Item {
    Item::new(DocId::new(id), "widget")
        .with_field("sku", FieldValue::Text(format!("SKU-{id:08}")))
        .with_field("price", FieldValue::Int(100 + id as i64))
}

fn bench_execute_batch_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("execute_batch_insert");

    for batch_size in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &batch_size| {
            let store = build_store();
            let ctx = AuthContext::default();
            let mut next_id = 1u64;
            b.iter(|| {
                let rows: Vec<Item> = (0..batch_size).map(|i| item(next_id + i as u64)).collect();
                next_id += batch_size as u64;
                rt.block_on(store.execute_batch(&ctx, rows, Vec::new())).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_plan_optimization(c: &mut Criterion) {
    let predicate = Predicate::Eq { field: "sku".to_string(), value: FieldValue::Text("SKU-00000001".to_string()) };
    let query = Query::new("widget", predicate);
    let stats = Statistics { total_rows: 1_000_000, distinct_values: [("sku".to_string(), 1_000_000)].into_iter().collect() };
    let indexes = vec![AvailableIndex { name: "by_sku".to_string(), fields: vec!["sku".to_string()] }];
    let planning_ctx = PlanningContext { statistics: &stats, indexes: &indexes };
    let limits = OptimizerLimits { max_plan_enumerations: 10_000, max_rule_applications: 50_000 };

    c.bench_function("optimize_equality_lookup", |b| {
        b.iter(|| {
            optimize(&query, &planning_ctx, limits).unwrap();
        });
    });
}

criterion_group!(benches, bench_execute_batch_insert, bench_plan_optimization);
criterion_main!(benches);
