//! Bitmap index (spec §4.3): one Roaring bitmap of doc ids per distinct
//! field value, for fast set operations (AND/OR/NOT across predicates)
//! without per-document entries.

use async_trait::async_trait;
use parking_lot::Mutex;
use roaring::RoaringBitmap;

use crate::core::error::Result;
use crate::core::types::Item;
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

pub struct BitmapMaintainer {
    name: String,
    field: String,
    subspace: Subspace,
    state: Mutex<IndexState>,
}

impl BitmapMaintainer {
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        BitmapMaintainer { name, field: field.into(), subspace, state: Mutex::new(IndexState::Readable) }
    }

    fn bitmap_key(&self, value: &Element) -> Vec<u8> {
        self.subspace.child("bitmap").key(&Tuple::new().push(value.clone()))
    }

    fn field_value(&self, item: &Item) -> Option<Element> {
        item.get_field(&self.field).and_then(|v| v.to_tuple_element())
    }

    async fn load(&self, tx: &dyn Transaction, key: &[u8]) -> Result<RoaringBitmap> {
        match tx.get(key).await? {
            Some(bytes) => Ok(RoaringBitmap::deserialize_from(&bytes[..])
                .map_err(|e| crate::core::error::Error::internal(e.to_string()))?),
            None => Ok(RoaringBitmap::new()),
        }
    }

    async fn store(&self, tx: &dyn Transaction, key: &[u8], bitmap: &RoaringBitmap) -> Result<()> {
        let mut bytes = Vec::new();
        bitmap
            .serialize_into(&mut bytes)
            .map_err(|e| crate::core::error::Error::internal(e.to_string()))?;
        tx.set(key, &bytes)
    }

    pub async fn matching(&self, tx: &dyn Transaction, value: &Element) -> Result<RoaringBitmap> {
        self.load(tx, &self.bitmap_key(value)).await
    }
}

#[async_trait]
impl IndexMaintainer for BitmapMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let Some(value) = self.field_value(item) else { return Ok(Vec::new()) };
        Ok(vec![IndexKv { key: self.bitmap_key(&value), value: Vec::new() }])
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        if let Some(old) = old {
            if let Some(value) = self.field_value(old) {
                let key = self.bitmap_key(&value);
                let mut bitmap = self.load(tx, &key).await?;
                bitmap.remove(old.id.value() as u32);
                self.store(tx, &key, &bitmap).await?;
            }
        }
        if let Some(new) = new {
            if let Some(value) = self.field_value(new) {
                let key = self.bitmap_key(&value);
                let mut bitmap = self.load(tx, &key).await?;
                bitmap.insert(new.id.value() as u32);
                self.store(tx, &key, &bitmap).await?;
            }
        }
        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub = self.subspace.child("bitmap");
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                RangeOptions::default(),
            )
            .await?;
        Ok(ValidationReport { entries_checked: rows.len() as u64, orphaned_entries: 0, missing_entries: 0 })
    }

    fn state(&self) -> IndexState {
        *self.state.lock()
    }

    fn set_state(&self, state: IndexState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DocId, FieldValue};
    use crate::kv::memory::MemoryDatabase;
    use crate::kv::Database;

    fn item(id: u64, status: &str) -> Item {
        Item::new(DocId::new(id), "task").with_field("status", FieldValue::Text(status.to_string()))
    }

    #[tokio::test]
    async fn bitmap_tracks_membership_across_writes() {
        let maintainer = BitmapMaintainer::new("by_status", "status");
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "open")), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item(2, "open")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let bitmap = maintainer.matching(tx2.as_ref(), &Element::Text("open".into())).await.unwrap();
        assert!(bitmap.contains(1));
        assert!(bitmap.contains(2));
        assert_eq!(bitmap.len(), 2);
    }
}
