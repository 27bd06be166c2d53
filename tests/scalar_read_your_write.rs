//! End-to-end scenario (spec §8): a write through `ItemStore` is visible
//! to a read through the same scalar index as soon as the write commits,
//! with no separate propagation step.

use std::sync::Arc;

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

fn user_type() -> ItemType {
    ItemType {
        name: "user".to_string(),
        primary_key_fields: vec!["id".to_string()],
        indexes: vec![IndexDescriptor { name: "by_email".to_string(), kind: IndexKind::Scalar, fields: vec!["email".to_string()], unique: true }],
        relationships: Vec::new(),
        path_template: vec![PathComponent::Literal("user".to_string())],
    }
}

fn user(id: u64, email: &str) -> Item {
    Item::new(DocId::new(id), "user")
        .with_field("id", FieldValue::Int(id as i64))
        .with_field("email", FieldValue::Text(email.to_string()))
}

#[tokio::test]
async fn write_is_visible_through_the_index_as_soon_as_it_commits() {
    let db: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
    let runner = Arc::new(TransactionRunner::new(db.clone(), Arc::new(ReadVersionCache::new(64))));
    let store = Arc::new(ItemStore::new(db.clone(), runner, TransformingSerializer::plain(), 64 * 1024, Arc::new(AllowAll)));

    let mut registry = MaintainerRegistry::new();
    registry.register(Arc::new(ScalarMaintainer::new("by_email", "email", true)));
    store.register_type(user_type(), registry);

    let ctx = AuthContext::default();
    store.execute_batch(&ctx, vec![user(1, "ada@example.com")], Vec::new()).await.unwrap();

    let fetched = store.get(&ctx, "user", recordkeep::tuple::Tuple::from_elements(vec![Element::UInt(1)])).await.unwrap();
    assert_eq!(fetched.unwrap().get_field("email"), Some(&FieldValue::Text("ada@example.com".to_string())));

    let by_id = store.maintainer("user", "by_email").unwrap();
    let scalar = by_id.as_scalar().expect("registered maintainer is a scalar index");
    let tx = db.create_transaction().await.unwrap();
    let ids = scalar.lookup(tx.as_ref(), &Element::Text("ada@example.com".to_string())).await.unwrap();
    assert_eq!(ids, vec![1]);

    // Updating the field moves the index entry in the same transaction the
    // item itself moves in; the stale value no longer resolves.
    store.execute_batch(&ctx, vec![user(1, "ada.lovelace@example.com")], Vec::new()).await.unwrap();
    let tx2 = db.create_transaction().await.unwrap();
    assert!(scalar.lookup(tx2.as_ref(), &Element::Text("ada@example.com".to_string())).await.unwrap().is_empty());
    assert_eq!(scalar.lookup(tx2.as_ref(), &Element::Text("ada.lovelace@example.com".to_string())).await.unwrap(), vec![1]);
}
