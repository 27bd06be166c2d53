//! Rank index (spec §4.3): keeps items ordered by a numeric score so
//! "what rank is this item" and "items around rank N" resolve to a prefix
//! scan instead of a full sort.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

pub struct RankMaintainer {
    name: String,
    score_field: String,
    subspace: Subspace,
    state: Mutex<IndexState>,
}

impl RankMaintainer {
    pub fn new(name: impl Into<String>, score_field: impl Into<String>) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        RankMaintainer { name, score_field: score_field.into(), subspace, state: Mutex::new(IndexState::Readable) }
    }

    fn score_of(&self, item: &Item) -> Option<f64> {
        match item.get_field(&self.score_field) {
            Some(FieldValue::Int(i)) => Some(*i as f64),
            Some(FieldValue::UInt(u)) => Some(*u as f64),
            Some(FieldValue::Float(f)) | Some(FieldValue::Number(f)) => Some(*f),
            _ => None,
        }
    }

    fn entry_key(&self, score: f64, doc_id: u64) -> Vec<u8> {
        self.subspace.child("by_score").key(&Tuple::new().push(Element::Float(score)).push(Element::UInt(doc_id)))
    }

    /// Count of entries with a strictly lower score than `doc_id`'s, i.e.
    /// the item's zero-based rank ascending by score.
    pub async fn rank_of(&self, tx: &dyn Transaction, doc_id: u64, score: f64) -> Result<u64> {
        let sub = self.subspace.child("by_score");
        let end = self.entry_key(score, doc_id);
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(end),
                RangeOptions::default(),
            )
            .await?;
        Ok(rows.len() as u64)
    }

    pub async fn top_n(&self, tx: &dyn Transaction, n: usize) -> Result<Vec<u64>> {
        let sub = self.subspace.child("by_score");
        let mut opts = RangeOptions::default();
        opts.reverse = true;
        opts.limit = Some(n);
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                opts,
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|kv| Tuple::unpack(&kv.key[sub.raw_prefix().len()..]).ok())
            .filter_map(|t| t.0.last().cloned())
            .filter_map(|el| if let Element::UInt(id) = el { Some(id) } else { None })
            .collect())
    }
}

#[async_trait]
impl IndexMaintainer for RankMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let Some(score) = self.score_of(item) else { return Ok(Vec::new()) };
        Ok(vec![IndexKv { key: self.entry_key(score, item.id.value()), value: Vec::new() }])
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        if let Some(old) = old {
            if let Some(score) = self.score_of(old) {
                tx.clear(&self.entry_key(score, old.id.value()))?;
            }
        }
        if let Some(new) = new {
            if let Some(score) = self.score_of(new) {
                tx.set(&self.entry_key(score, new.id.value()), &[])?;
            }
        }
        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub = self.subspace.child("by_score");
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
    use crate::core::types::DocId;
    use crate::kv::memory::MemoryDatabase;
    use crate::kv::Database;

    fn item(id: u64, score: f64) -> Item {
        Item::new(DocId::new(id), "player").with_field("score", FieldValue::Float(score))
    }

    #[tokio::test]
    async fn top_n_returns_highest_scores_first() {
        let maintainer = RankMaintainer::new("by_score", "score");
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        for (id, score) in [(1, 10.0), (2, 50.0), (3, 30.0)] {
            maintainer.update(None, Some(&item(id, score)), tx.as_ref()).await.unwrap();
        }
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let top = maintainer.top_n(tx2.as_ref(), 2).await.unwrap();
        assert_eq!(top, vec![2, 3]);
    }
}
