//! Scalar/range index (spec §4.3): one entry per indexed field value,
//! ordered so range scans and equality lookups both resolve to a single
//! subspace prefix scan. Optionally enforces uniqueness.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::{Error, Result};
use crate::core::types::Item;
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

pub struct ScalarMaintainer {
    name: String,
    field: String,
    subspace: Subspace,
    unique: bool,
    state: Mutex<IndexState>,
}

impl ScalarMaintainer {
    pub fn new(name: impl Into<String>, field: impl Into<String>, unique: bool) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        ScalarMaintainer { name, field: field.into(), subspace, unique, state: Mutex::new(IndexState::Readable) }
    }

    fn entry_key(&self, value: &Element, doc_id: u64) -> Vec<u8> {
        self.subspace.child("entries").key(&Tuple::new().push(value.clone()).push(Element::UInt(doc_id)))
    }

    fn unique_key(&self, value: &Element) -> Vec<u8> {
        self.subspace.child("unique").key(&Tuple::new().push(value.clone()))
    }

    fn violation_key(&self, value: &Element) -> Vec<u8> {
        self.subspace.child("_violations").key(&Tuple::new().push(value.clone()))
    }

    fn field_value(&self, item: &Item) -> Option<Element> {
        item.get_field(&self.field).and_then(|v| v.to_tuple_element())
    }

    /// Doc ids for items whose indexed field equals `value` exactly.
    pub async fn lookup(&self, tx: &dyn Transaction, value: &Element) -> Result<Vec<u64>> {
        let sub = self.subspace.child("entries");
        let value_prefix = Tuple::new().push(value.clone()).pack_with_prefix(sub.raw_prefix());
        let mut end = value_prefix.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(value_prefix.clone()),
                KeySelector::first_greater_or_equal(end),
                RangeOptions::default(),
            )
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let suffix = &row.key[value_prefix.len()..];
            let tuple = Tuple::unpack(suffix).map_err(Error::internal)?;
            if let Some(Element::UInt(id)) = tuple.0.first() {
                ids.push(*id);
            }
        }
        Ok(ids)
    }

    /// Doc ids for items whose indexed field falls in `[start, end)`.
    /// `None` on either bound scans to the edge of the index's key range.
    pub async fn scan_range(
        &self,
        tx: &dyn Transaction,
        start: Option<&Element>,
        end: Option<&Element>,
    ) -> Result<Vec<u64>> {
        let sub = self.subspace.child("entries");
        let prefix_len = sub.raw_prefix().len();
        let begin_key = match start {
            Some(v) => Tuple::new().push(v.clone()).pack_with_prefix(sub.raw_prefix()),
            None => sub.raw_prefix().to_vec(),
        };
        let end_key = match end {
            Some(v) => Tuple::new().push(v.clone()).pack_with_prefix(sub.raw_prefix()),
            None => sub.range_end(),
        };
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(begin_key),
                KeySelector::first_greater_or_equal(end_key),
                RangeOptions::default(),
            )
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let suffix = &row.key[prefix_len..];
            let tuple = Tuple::unpack(suffix).map_err(Error::internal)?;
            if let Some(Element::UInt(id)) = tuple.0.get(1) {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}

fn decode_doc_id(bytes: &[u8]) -> String {
    bytes
        .try_into()
        .map(u64::from_le_bytes)
        .map(|id| id.to_string())
        .unwrap_or_else(|_| format!("{bytes:?}"))
}

#[async_trait]
impl IndexMaintainer for ScalarMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let Some(value) = self.field_value(item) else { return Ok(Vec::new()) };
        Ok(vec![IndexKv { key: self.entry_key(&value, item.id.value()), value: Vec::new() }])
    }

    fn as_scalar(&self) -> Option<&ScalarMaintainer> {
        Some(self)
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        if let Some(old) = old {
            if let Some(value) = self.field_value(old) {
                tx.clear(&self.entry_key(&value, old.id.value()))?;
                if self.unique {
                    tx.clear(&self.unique_key(&value))?;
                }
            }
        }

        if let Some(new) = new {
            if let Some(value) = self.field_value(new) {
                if self.unique {
                    let key = self.unique_key(&value);
                    match tx.get(&key).await? {
                        Some(existing) if existing != new.id.value().to_le_bytes() => {
                            // In `WriteOnly` the index isn't authoritative for
                            // reads yet, so a conflicting value is recorded
                            // for the scrubber/readiness check rather than
                            // failing the write outright (spec §4.4); once
                            // `Readable`, uniqueness is enforced immediately.
                            if self.state() == IndexState::Readable {
                                return Err(Error::uniqueness_violation(
                                    self.name.clone(),
                                    format!("{value:?}"),
                                    decode_doc_id(&existing),
                                ));
                            }
                            tx.set(&self.violation_key(&value), &new.id.value().to_le_bytes())?;
                        }
                        _ => tx.set(&key, &new.id.value().to_le_bytes())?,
                    }
                }
                tx.set(&self.entry_key(&value, new.id.value()), &[])?;
            }
        }

        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub = self.subspace.child("entries");
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

    fn item(id: u64, email: &str) -> Item {
        Item::new(DocId::new(id), "user").with_field("email", FieldValue::Text(email.to_string()))
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicate_value() {
        let maintainer = ScalarMaintainer::new("by_email", "email", true);
        let db = MemoryDatabase::new();

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "a@x.com")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let result = maintainer.update(None, Some(&item(2, "a@x.com")), tx2.as_ref()).await;
        assert!(matches!(result, Err(Error::UniquenessViolation { .. })));
    }

    #[tokio::test]
    async fn write_only_index_records_violation_instead_of_erroring() {
        let maintainer = ScalarMaintainer::new("by_email", "email", true);
        maintainer.set_state(IndexState::WriteOnly);
        let db = MemoryDatabase::new();

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "a@x.com")), tx.as_ref()).await.unwrap();
        let result = maintainer.update(None, Some(&item(2, "a@x.com")), tx.as_ref()).await;
        assert!(result.is_ok());
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let violation = tx2.get(&maintainer.violation_key(&Element::Text("a@x.com".to_string()))).await.unwrap();
        assert!(violation.is_some());
    }

    #[tokio::test]
    async fn lookup_finds_doc_ids_for_exact_value() {
        let maintainer = ScalarMaintainer::new("by_email", "email", false);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, "a@x.com")), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item(2, "b@x.com")), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let ids = maintainer.lookup(tx2.as_ref(), &Element::Text("a@x.com".to_string())).await.unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn scan_range_finds_doc_ids_within_bounds() {
        let maintainer = ScalarMaintainer::new("by_age", "age", false);
        let db = MemoryDatabase::new();
        let age_item = |id: u64, age: i64| Item::new(DocId::new(id), "user").with_field("age", FieldValue::Int(age));

        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&age_item(1, 20)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&age_item(2, 30)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&age_item(3, 40)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let ids = maintainer
            .scan_range(tx2.as_ref(), Some(&Element::Int(20)), Some(&Element::Int(40)))
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }
}
