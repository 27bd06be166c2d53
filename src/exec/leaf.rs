//! Production `LeafSource` (spec §4.10): resolves leaf physical plans
//! against a live `ItemStore` and its registered maintainers, going through
//! each index family's own typed query surface (`index::scalar`'s
//! `lookup`/`scan_range`, `vector::maintainer`'s `search`) and the
//! doc-id index to turn matched ids back into full items. `demos/
//! basic_usage.rs`'s `SeqScanLeaves` stays as a minimal smoke-test stand-in;
//! this is the one an embedding application actually wires up.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::types::{FieldValue, Item};
use crate::exec::operators::LeafSource;
use crate::kv::Transaction;
use crate::query::ast::{Predicate, VectorProbe};
use crate::query::plan::PhysicalPlan;
use crate::storage::store::ItemStore;

/// One item type's leaf resolver. A `Query` always names a single
/// `item_type` (spec §4.8), so a fresh one is built per query rather than
/// threading the type name through every plan node.
pub struct StoreLeafSource {
    store: Arc<ItemStore>,
    item_type: String,
}

impl StoreLeafSource {
    pub fn new(store: Arc<ItemStore>, item_type: impl Into<String>) -> Self {
        StoreLeafSource { store, item_type: item_type.into() }
    }

    async fn resolve(&self, tx: &dyn Transaction, doc_ids: Vec<u64>) -> Result<Vec<Item>> {
        let mut out = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            if let Some(item) = self.store.read_item_by_doc_id(tx, &self.item_type, doc_id).await? {
                out.push(item);
            }
        }
        Ok(out)
    }

    async fn scalar_lookup(
        &self,
        tx: &dyn Transaction,
        index: &str,
        equality_prefix: &[(String, FieldValue)],
        range: &Option<Predicate>,
    ) -> Result<Vec<u64>> {
        let maintainer = self
            .store
            .maintainer(&self.item_type, index)
            .ok_or_else(|| Error::not_found(format!("no index named {index} registered for {}", self.item_type)))?;
        let Some(scalar) = maintainer.as_scalar() else {
            return Err(Error::invalid_argument(format!("index {index} is not a scalar/range index")));
        };

        // A compound index's lead field narrows the scan (spec §4.4); this
        // crate's scalar index is single-field, so only the first equality
        // pair is used, with an optional trailing range predicate.
        if let Some(Predicate::Range { gt, gte, lt, lte, .. }) = range {
            let low = gt.as_ref().or(gte.as_ref()).and_then(FieldValue::to_tuple_element);
            let high = lt.as_ref().or(lte.as_ref()).and_then(FieldValue::to_tuple_element);
            return scalar.scan_range(tx, low.as_ref(), high.as_ref()).await;
        }
        match equality_prefix.first().and_then(|(_, v)| v.to_tuple_element()) {
            Some(element) => scalar.lookup(tx, &element).await,
            None => Ok(Vec::new()),
        }
    }

    async fn scalar_union(&self, tx: &dyn Transaction, index: &str, values: &[FieldValue]) -> Result<Vec<u64>> {
        let maintainer = self
            .store
            .maintainer(&self.item_type, index)
            .ok_or_else(|| Error::not_found(format!("no index named {index} registered for {}", self.item_type)))?;
        let Some(scalar) = maintainer.as_scalar() else {
            return Err(Error::invalid_argument(format!("index {index} is not a scalar/range index")));
        };
        let mut ids = Vec::new();
        for value in values {
            if let Some(element) = value.to_tuple_element() {
                ids.extend(scalar.lookup(tx, &element).await?);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl LeafSource for StoreLeafSource {
    async fn fetch(&self, tx: &dyn Transaction, plan: &PhysicalPlan) -> Result<Vec<Item>> {
        match plan {
            PhysicalPlan::SeqScan { item_type } => {
                let doc_ids = self.store.doc_ids_for_type(tx, item_type).await?;
                self.resolve(tx, doc_ids).await
            }
            PhysicalPlan::IndexScan { index, equality_prefix, range } => {
                let ids = self.scalar_lookup(tx, index, equality_prefix, range).await?;
                self.resolve(tx, ids).await
            }
            PhysicalPlan::InJoin { index, values, .. } | PhysicalPlan::InUnion { index, values, .. } => {
                let ids = self.scalar_union(tx, index, values).await?;
                self.resolve(tx, ids).await
            }
            PhysicalPlan::AggregationLookup { index, .. } => {
                Err(Error::invalid_argument(format!("{index} is an aggregate index; read its value directly rather than through fetch")))
            }
            other => Err(Error::invalid_argument(format!("{} is not a leaf plan", other.describe()))),
        }
    }

    async fn fetch_scored(&self, tx: &dyn Transaction, plan: &PhysicalPlan, probe: &VectorProbe) -> Result<Vec<(Item, f64)>> {
        let PhysicalPlan::IndexScan { index, .. } = plan else {
            return Err(Error::invalid_argument("a fusion source must be an IndexScan over a vector index"));
        };
        let maintainer = self
            .store
            .maintainer(&self.item_type, index)
            .ok_or_else(|| Error::not_found(format!("no index named {index} registered for {}", self.item_type)))?;
        let Some(vector) = maintainer.as_vector() else {
            return Err(Error::invalid_argument(format!("index {index} is not a vector index")));
        };

        let scored = vector.search(tx, &probe.query, probe.k).await?;
        let mut out = Vec::with_capacity(scored.len());
        for (doc_id, score) in scored {
            if let Some(item) = self.store.read_item_by_doc_id(tx, &self.item_type, doc_id).await? {
                out.push((item, score as f64));
            }
        }
        Ok(out)
    }
}
