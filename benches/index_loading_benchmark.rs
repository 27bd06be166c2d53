use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use recordkeep::core::config::Config;
use recordkeep::core::error::Result;
use recordkeep::core::types::{DocId, FieldValue, Item};
use recordkeep::index::scalar::ScalarMaintainer;
use recordkeep::kv::memory::MemoryDatabase;
use recordkeep::kv::Database;
use recordkeep::online::build::sequential;
use recordkeep::online::throttle::AdaptiveThrottle;
use recordkeep::storage::serializer::TransformingSerializer;
use recordkeep::storage::split;
use recordkeep::storage::subspaces::Subspaces;
use recordkeep::tuple::{Element, Tuple};

fn item(id: u64) -> Item {
    Item::new(DocId::new(id), "widget").with_field("sku", FieldValue::Text(format!("SKU-{id:08}")))
}

fn seed(rt: &tokio::runtime::Runtime, doc_count: usize) -> (MemoryDatabase, Subspaces, TransformingSerializer, Vec<Tuple>) {
    let db = MemoryDatabase::new();
    let subspaces = Subspaces::new();
    let serializer = TransformingSerializer::plain();
    let keys: Vec<Tuple> = (1..=doc_count as u64).map(|i| Tuple::new().push(Element::UInt(i))).collect();

    rt.block_on(async {
        let tx = db.create_transaction().await.unwrap();
        for (i, key) in keys.iter().enumerate() {
            let it = item(i as u64 + 1);
            let bytes = serializer.serialize(&bincode::serialize(&it).unwrap()).unwrap();
            split::write(tx.as_ref(), &subspaces.items_for_type("widget").key(key), &bytes, 90 * 1024, 90 * 1024).unwrap();
        }
        tx.commit().await.unwrap();
    });

    (db, subspaces, serializer, keys)
}

fn bench_online_sequential_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("online_sequential_build");

    for doc_count in [100usize, 1_000, 5_000] {
        let (db, subspaces, serializer, keys) = seed(&rt, doc_count);
        let decode = |bytes: &[u8]| -> Result<Item> {
            let plain = serializer.deserialize(bytes)?;
            Ok(bincode::deserialize(&plain)?)
        };

        group.bench_with_input(BenchmarkId::from_parameter(doc_count), &doc_count, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let maintainer = ScalarMaintainer::new("by_sku", "sku", false);
                    let mut throttle = AdaptiveThrottle::new(&Config::default());
                    sequential(&db, &subspaces, "widget", &keys, &decode, &maintainer, &mut throttle).await.unwrap();
                })
            });
        });
    }

    group.finish();
}

fn bench_scalar_maintainer_update(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let db = MemoryDatabase::new();
    let maintainer = ScalarMaintainer::new("by_sku", "sku", false);

    c.bench_function("scalar_maintainer_update", |b| {
        b.iter(|| {
            rt.block_on(async {
                let tx = db.create_transaction().await.unwrap();
                maintainer.update(None, Some(&item(1)), tx.as_ref()).await.unwrap();
            })
        });
    });
}

criterion_group!(benches, bench_online_sequential_build, bench_scalar_maintainer_update);
criterion_main!(benches);
