//! End-to-end scenario (spec §8): an online build crashes partway through
//! (simulated by persisting progress directly, the way a real crash would
//! leave it) and a fresh `sequential` call resumes from that point instead
//! of rescanning what already completed.

use recordkeep::core::config::Config;
use recordkeep::core::error::Result;
use recordkeep::core::types::{DocId, FieldValue, Item};
use recordkeep::index::maintainer::{IndexMaintainer, IndexState};
use recordkeep::index::scalar::ScalarMaintainer;
use recordkeep::kv::memory::MemoryDatabase;
use recordkeep::online::build::sequential;
use recordkeep::online::throttle::AdaptiveThrottle;
use recordkeep::storage::serializer::TransformingSerializer;
use recordkeep::storage::split;
use recordkeep::storage::subspaces::Subspaces;
use recordkeep::tuple::{Element, Tuple};

fn user(id: u64, email: &str) -> Item {
    Item::new(DocId::new(id), "user").with_field("email", FieldValue::Text(email.to_string()))
}

#[tokio::test]
async fn sequential_build_skips_work_already_marked_done() {
    let db = MemoryDatabase::new();
    let subspaces = Subspaces::new();
    let serializer = TransformingSerializer::plain();

    let keys: Vec<Tuple> = (1..=4u64).map(|i| Tuple::new().push(Element::UInt(i))).collect();
    let tx = db.create_transaction().await.unwrap();
    for (i, key) in keys.iter().enumerate() {
        let it = user(i as u64 + 1, &format!("user{i}@example.com"));
        let bytes = serializer.serialize(&bincode::serialize(&it).unwrap()).unwrap();
        split::write(tx.as_ref(), &subspaces.items_for_type("user").key(key), &bytes, 90 * 1024, 90 * 1024).unwrap();
    }
    tx.commit().await.unwrap();

    let maintainer = ScalarMaintainer::new("by_email", "email", false);

    // Leave the build's progress as if the first two keys already committed
    // and the process died before the third: the maintainer already has
    // those two entries, and the persisted bitmap marks positions 0 and 1
    // done. This is written through the same public subspace/transaction
    // surface an embedding application would use to inspect build state,
    // not through any build-module internals.
    let tx = db.create_transaction().await.unwrap();
    maintainer.update(None, Some(&user(1, "user0@example.com")), tx.as_ref()).await.unwrap();
    maintainer.update(None, Some(&user(2, "user1@example.com")), tx.as_ref()).await.unwrap();

    let mut progress = roaring::RoaringBitmap::new();
    progress.insert(0);
    progress.insert(1);
    let mut bytes = Vec::new();
    progress.serialize_into(&mut bytes).unwrap();
    let progress_key = subspaces.index_state_for(maintainer.name()).child("progress").key(&Tuple::new());
    tx.set(&progress_key, &bytes).unwrap();
    tx.commit().await.unwrap();

    let mut throttle = AdaptiveThrottle::new(&Config::default());
    let decode = |bytes: &[u8]| -> Result<Item> {
        let plain = serializer.deserialize(bytes)?;
        Ok(bincode::deserialize(&plain)?)
    };

    let report = sequential(&db, &subspaces, "user", &keys, &decode, &maintainer, &mut throttle).await.unwrap();
    assert_eq!(report.items_scanned, 2, "resumed build should only scan the keys left after the persisted offset");
    assert_eq!(maintainer.state(), IndexState::Readable);

    let verify_tx = db.create_transaction().await.unwrap();
    for (i, email) in ["user0@example.com", "user1@example.com", "user2@example.com", "user3@example.com"].iter().enumerate() {
        let ids = maintainer.lookup(verify_tx.as_ref(), &Element::Text(email.to_string())).await.unwrap();
        assert_eq!(ids, vec![i as u64 + 1], "every key, resumed or original, ends up indexed");
    }

    // A completed build clears its progress marker so a later rebuild
    // starts from scratch rather than thinking it's still mid-flight.
    let cleared = verify_tx.get(&progress_key).await.unwrap();
    assert!(cleared.is_none());
}
