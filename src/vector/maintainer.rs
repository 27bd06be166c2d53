//! Vector index maintainer (spec §4.6). The HNSW graph is kept as one
//! serialized blob rather than per-node KV entries: a single insert can
//! touch neighbor lists several layers deep, and materializing that as
//! independent keys would need a second index just to keep them
//! consistent. The cost is an O(index size) read-modify-write per update;
//! acceptable for the reference engine, revisited by the online indexer's
//! batching for larger corpora (spec §4.11).

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::Transaction;
use crate::storage::split;
use crate::tuple::{Subspace, Tuple};

use super::distance::Metric;
use super::hnsw::HnswIndex;

pub struct VectorMaintainer {
    name: String,
    field: String,
    metric: Metric,
    m: usize,
    ef_construction: usize,
    pub ef_search: usize,
    subspace: Subspace,
    split_threshold: usize,
    state: Mutex<IndexState>,
}

impl VectorMaintainer {
    pub fn new(name: impl Into<String>, field: impl Into<String>, metric: Metric, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        VectorMaintainer {
            name,
            field: field.into(),
            metric,
            m,
            ef_construction,
            ef_search,
            subspace,
            split_threshold: 90 * 1024,
            state: Mutex::new(IndexState::Readable),
        }
    }

    fn graph_key(&self) -> Vec<u8> {
        self.subspace.child("graph").key(&Tuple::new())
    }

    fn vector_of(&self, item: &Item) -> Option<Vec<f32>> {
        match item.get_field(&self.field)? {
            FieldValue::List(values) => Some(
                values
                    .iter()
                    .filter_map(|v| match v {
                        FieldValue::Float(f) | FieldValue::Number(f) => Some(*f as f32),
                        FieldValue::Int(i) => Some(*i as f32),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    async fn load(&self, tx: &dyn Transaction) -> Result<HnswIndex> {
        match split::read(tx, &self.graph_key()).await? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(HnswIndex::new(self.m, self.ef_construction, self.metric)),
        }
    }

    async fn save(&self, tx: &dyn Transaction, index: &HnswIndex) -> Result<()> {
        let bytes = bincode::serialize(index)?;
        split::write(tx, &self.graph_key(), &bytes, self.split_threshold, self.split_threshold)
    }

    pub async fn search(&self, tx: &dyn Transaction, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        let index = self.load(tx).await?;
        Ok(index.search(query, k, self.ef_search))
    }

    /// ACORN predicate-aware search: `allowed` gates which doc ids count
    /// towards the result, without breaking graph connectivity through
    /// nodes it rejects. `expansion` should grow as the predicate's
    /// selectivity shrinks; callers that know an index's selectivity (via
    /// `query::ast::Statistics`) can scale it accordingly.
    pub async fn search_filtered(&self, tx: &dyn Transaction, query: &[f32], k: usize, expansion: usize, allowed: &dyn Fn(u64) -> bool) -> Result<Vec<(u64, f32)>> {
        let index = self.load(tx).await?;
        Ok(index.search_filtered(query, k, self.ef_search, expansion, allowed))
    }
}

#[async_trait]
impl IndexMaintainer for VectorMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        if self.vector_of(item).is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![IndexKv { key: self.graph_key(), value: Vec::new() }])
    }

    fn as_vector(&self) -> Option<&VectorMaintainer> {
        Some(self)
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        let mut index = self.load(tx).await?;

        if let Some(old) = old {
            if self.vector_of(old).is_some() {
                index.remove(old.id.value());
            }
        }
        if let Some(new) = new {
            if let Some(vector) = self.vector_of(new) {
                index.insert(new.id.value(), vector);
            }
        }

        self.save(tx, &index).await
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let index = self.load(tx).await?;
        Ok(ValidationReport { entries_checked: index.len() as u64, orphaned_entries: 0, missing_entries: 0 })
    }

    fn state(&self) -> IndexState {
        *self.state.lock()
    }

    fn set_state(&self, state: IndexState) {
        *self.state.lock() = state;
    }
}
