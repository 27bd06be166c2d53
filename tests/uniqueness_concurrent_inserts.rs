//! End-to-end scenario (spec §8): two concurrent inserts racing on the same
//! unique scalar value. Exactly one wins; the other observes a
//! `UniquenessViolation`, never a silently dropped or duplicated row.

use std::sync::Arc;

use recordkeep::core::error::Error;
use recordkeep::core::read_version_cache::ReadVersionCache;
use recordkeep::core::transaction::TransactionRunner;
use recordkeep::core::types::{DocId, FieldValue, IndexDescriptor, IndexKind, Item, ItemType, PathComponent};
use recordkeep::index::maintainer::MaintainerRegistry;
use recordkeep::index::scalar::ScalarMaintainer;
use recordkeep::kv::memory::MemoryDatabase;
use recordkeep::kv::Database;
use recordkeep::storage::serializer::TransformingSerializer;
use recordkeep::storage::store::{AllowAll, AuthContext, ItemStore};
use recordkeep::tuple::Element;

fn account_type() -> ItemType {
    ItemType {
        name: "account".to_string(),
        primary_key_fields: vec!["id".to_string()],
        indexes: vec![IndexDescriptor { name: "by_handle".to_string(), kind: IndexKind::Scalar, fields: vec!["handle".to_string()], unique: true }],
        relationships: Vec::new(),
        path_template: vec![PathComponent::Literal("account".to_string())],
    }
}

fn account(id: u64, handle: &str) -> Item {
    Item::new(DocId::new(id), "account")
        .with_field("id", FieldValue::Int(id as i64))
        .with_field("handle", FieldValue::Text(handle.to_string()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_concurrent_insert_wins_the_unique_handle() {
    let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let runner = Arc::new(TransactionRunner::new(db.clone(), Arc::new(ReadVersionCache::new(64))));
    let store = Arc::new(ItemStore::new(db.clone(), runner, TransformingSerializer::plain(), 64 * 1024, Arc::new(AllowAll)));

    let mut registry = MaintainerRegistry::new();
    registry.register(Arc::new(ScalarMaintainer::new("by_handle", "handle", true)));
    store.register_type(account_type(), registry);

    let store_a = store.clone();
    let store_b = store.clone();
    let a = tokio::spawn(async move { store_a.execute_batch(&AuthContext::default(), vec![account(1, "ada")], Vec::new()).await });
    let b = tokio::spawn(async move { store_b.execute_batch(&AuthContext::default(), vec![account(2, "ada")], Vec::new()).await });

    let (ra, rb) = tokio::join!(a, b);
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    let outcomes = [ra.is_ok(), rb.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one insert should win the unique handle");

    let loser = if ra.is_err() { ra } else { rb };
    assert!(matches!(loser.unwrap_err(), Error::UniquenessViolation { .. }));

    let by_handle = store.maintainer("account", "by_handle").unwrap();
    let scalar = by_handle.as_scalar().unwrap();
    let tx = db.create_transaction().await.unwrap();
    let ids = scalar.lookup(tx.as_ref(), &Element::Text("ada".to_string())).await.unwrap();
    assert_eq!(ids.len(), 1, "only the winner's entry should remain in the index");
}
