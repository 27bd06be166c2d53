//! Relationship index (spec §4.4): maintains both the forward edge
//! (`child -> target`) and the inverse edge (`target -> {children}`) so a
//! delete on the target side can enumerate referencing items and apply its
//! `DeleteRule`.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::types::{DeleteRule, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

pub struct RelationshipMaintainer {
    name: String,
    field: String,
    delete_rule: DeleteRule,
    subspace: Subspace,
    state: Mutex<IndexState>,
}

impl RelationshipMaintainer {
    pub fn new(name: impl Into<String>, field: impl Into<String>, delete_rule: DeleteRule) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        RelationshipMaintainer { name, field: field.into(), delete_rule, subspace, state: Mutex::new(IndexState::Readable) }
    }

    pub fn delete_rule(&self) -> DeleteRule {
        self.delete_rule
    }

    fn forward_key(&self, child_id: u64) -> Vec<u8> {
        self.subspace.child("forward").key(&Tuple::new().push(Element::UInt(child_id)))
    }

    fn inverse_key(&self, target: &Element, child_id: u64) -> Vec<u8> {
        self.subspace
            .child("inverse")
            .key(&Tuple::new().push(target.clone()).push(Element::UInt(child_id)))
    }

    fn target_of(&self, item: &Item) -> Option<Element> {
        item.get_field(&self.field).and_then(|v| v.to_tuple_element())
    }

    /// Every item whose `field` currently points at `target`, for cascade
    /// delete/deny/nullify enforcement by the item store.
    pub async fn referencing_items(&self, tx: &dyn Transaction, target: &Element) -> Result<Vec<u64>> {
        let sub = self.subspace.child("inverse").key(&Tuple::new().push(target.clone()));
        let mut end = sub.clone();
        end.push(0xFF);
        let rows = tx
            .get_range(KeySelector::first_greater_or_equal(sub), KeySelector::first_greater_or_equal(end), RangeOptions::default())
            .await?;
        let ids = rows
            .into_iter()
            .filter_map(|kv| Tuple::unpack(&kv.key[self.subspace.child("inverse").raw_prefix().len()..]).ok())
            .filter_map(|t| t.0.last().cloned())
            .filter_map(|el| if let Element::UInt(id) = el { Some(id) } else { None })
            .collect();
        Ok(ids)
    }
}

#[async_trait]
impl IndexMaintainer for RelationshipMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let Some(target) = self.target_of(item) else { return Ok(Vec::new()) };
        Ok(vec![
            IndexKv { key: self.forward_key(item.id.value()), value: target.pack() },
            IndexKv { key: self.inverse_key(&target, item.id.value()), value: Vec::new() },
        ])
    }

    fn as_relationship(&self) -> Option<&RelationshipMaintainer> {
        Some(self)
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        if let Some(old) = old {
            if let Some(target) = self.target_of(old) {
                tx.clear(&self.forward_key(old.id.value()))?;
                tx.clear(&self.inverse_key(&target, old.id.value()))?;
            }
        }

        if let Some(new) = new {
            if let Some(target) = self.target_of(new) {
                tx.set(&self.forward_key(new.id.value()), &target.pack())?;
                tx.set(&self.inverse_key(&target, new.id.value()), &[])?;
            }
        }

        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub = self.subspace.child("forward");
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

    fn item(id: u64, target: u64) -> Item {
        Item::new(DocId::new(id), "comment").with_field("post_id", FieldValue::UInt(target))
    }

    #[tokio::test]
    async fn referencing_items_finds_all_children_of_a_target() {
        let maintainer = RelationshipMaintainer::new("comment_post", "post_id", DeleteRule::Cascade);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item(1, 100)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item(2, 100)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item(3, 200)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let mut children = maintainer.referencing_items(tx2.as_ref(), &Element::UInt(100)).await.unwrap();
        children.sort();
        assert_eq!(children, vec![1, 2]);
    }
}
