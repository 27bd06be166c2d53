//! Leaderboard index (spec §4.3): like `rank`, but additionally
//! materializes a top-K cache so repeated "show me the leaderboard" reads
//! don't re-scan the ordered subspace on every call.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

pub struct LeaderboardMaintainer {
    name: String,
    score_field: String,
    window: usize,
    subspace: Subspace,
    state: Mutex<IndexState>,
}

impl LeaderboardMaintainer {
    pub fn new(name: impl Into<String>, score_field: impl Into<String>, window: usize) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        LeaderboardMaintainer {
            name,
            score_field: score_field.into(),
            window,
            subspace,
            state: Mutex::new(IndexState::Readable),
        }
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

    /// Recomputes the materialized top-`window` cache. Called after a
    /// write batch touching this index rather than on every single update,
    /// since it is a full prefix scan.
    pub async fn refresh_cache(&self, tx: &dyn Transaction) -> Result<()> {
        let sub = self.subspace.child("by_score");
        let mut opts = RangeOptions::default();
        opts.reverse = true;
        opts.limit = Some(self.window);
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                opts,
            )
            .await?;
        let cache_key = self.subspace.child("cache").key(&Tuple::new());
        let ids: Vec<u64> = rows
            .into_iter()
            .filter_map(|kv| Tuple::unpack(&kv.key[sub.raw_prefix().len()..]).ok())
            .filter_map(|t| t.0.last().cloned())
            .filter_map(|el| if let Element::UInt(id) = el { Some(id) } else { None })
            .collect();
        tx.set(&cache_key, &bincode::serialize(&ids)?)?;
        Ok(())
    }

    pub async fn cached_top(&self, tx: &dyn Transaction) -> Result<Vec<u64>> {
        let cache_key = self.subspace.child("cache").key(&Tuple::new());
        match tx.get(&cache_key).await? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl IndexMaintainer for LeaderboardMaintainer {
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
        self.refresh_cache(tx).await
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
    async fn cache_reflects_top_window_after_update() {
        let maintainer = LeaderboardMaintainer::new("top_players", "score", 2);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        for (id, score) in [(1, 10.0), (2, 50.0), (3, 30.0)] {
            maintainer.update(None, Some(&item(id, score)), tx.as_ref()).await.unwrap();
        }
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let top = maintainer.cached_top(tx2.as_ref()).await.unwrap();
        assert_eq!(top, vec![2, 3]);
    }
}
