//! Physical operators (spec §4.10): Scan/Filter/Sort/Limit/InJoin/InUnion/
//! Fusion/AggregationLookup over a `PhysicalPlan`. Leaf plans (`SeqScan`,
//! `IndexScan`, `InJoin`, `InUnion`, `AggregationLookup`) are resolved by a
//! caller-supplied `LeafSource` rather than hardcoded here: each index
//! family (`index::scalar`, `index::bitmap`, `fulltext`, `vector`,
//! `graph`) already exposes its own typed query surface and its own way of
//! mapping a matched entry back to an `Item`, so this module stays generic
//! over "however a leaf produces rows" and only implements the composition
//! operators spec §4.9's cost model treats as uniform across index
//! families.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::kv::Transaction;
use crate::query::ast::{Predicate, SortKey, SortOrder, VectorProbe};
use crate::query::plan::PhysicalPlan;
use crate::tuple::{Element, Tuple};

#[async_trait]
pub trait LeafSource: Send + Sync {
    /// Resolves a non-scored leaf plan (`SeqScan`, `IndexScan`, `InJoin`,
    /// `InUnion`, `AggregationLookup`) to its matching items.
    async fn fetch(&self, tx: &dyn Transaction, plan: &PhysicalPlan) -> Result<Vec<Item>>;

    /// Resolves one fusion source (a vector probe against `plan`) to its
    /// scored items.
    async fn fetch_scored(&self, tx: &dyn Transaction, plan: &PhysicalPlan, probe: &VectorProbe) -> Result<Vec<(Item, f64)>>;
}

fn is_leaf(plan: &PhysicalPlan) -> bool {
    matches!(
        plan,
        PhysicalPlan::SeqScan { .. }
            | PhysicalPlan::IndexScan { .. }
            | PhysicalPlan::InJoin { .. }
            | PhysicalPlan::InUnion { .. }
            | PhysicalPlan::AggregationLookup { .. }
    )
}

type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Item>>> + Send + 'a>>;

/// Executes `plan` to completion, returning its full materialized result
/// set. Sort and Fusion both require every upstream row before they can
/// produce output, so there is no benefit to a streaming executor here —
/// the `Cursor` in `exec::cursor` provides the paging/stop-reason contract
/// on top of the materialized rows.
///
/// Manually boxes its own recursion (the same `Pin<Box<dyn Future>>` idiom
/// `core::transaction::TransactionRunner` uses) since an `async fn` cannot
/// call itself without a statically infinite future type.
pub fn execute<'a>(plan: &'a PhysicalPlan, tx: &'a dyn Transaction, leaves: &'a dyn LeafSource) -> ExecFuture<'a> {
    Box::pin(async move {
        if is_leaf(plan) {
            return leaves.fetch(tx, plan).await;
        }

        match plan {
            PhysicalPlan::Filter { predicate, input } => {
                let rows = execute(input, tx, leaves).await?;
                Ok(rows.into_iter().filter(|item| evaluate(predicate, item)).collect())
            }
            PhysicalPlan::Sort { key, input } => {
                let mut rows = execute(input, tx, leaves).await?;
                rows.sort_by(|a, b| compare_by_key(a, b, key));
                Ok(rows)
            }
            PhysicalPlan::Limit { n, offset, input } => {
                let rows = execute(input, tx, leaves).await?;
                Ok(rows.into_iter().skip(*offset).take(*n).collect())
            }
            PhysicalPlan::Fusion { sources, strategy, candidates_per_source } => {
                let mut by_id: HashMap<u64, Item> = HashMap::new();
                let mut scored_lists: Vec<Vec<(u64, f64)>> = Vec::with_capacity(sources.len());
                for (source_plan, probe) in sources {
                    let scored = leaves.fetch_scored(tx, source_plan, probe).await?;
                    let mut pairs = Vec::with_capacity(scored.len().min(*candidates_per_source));
                    for (item, score) in scored.into_iter().take(*candidates_per_source) {
                        pairs.push((item.id.value(), score));
                        by_id.entry(item.id.value()).or_insert(item);
                    }
                    scored_lists.push(pairs);
                }
                let fused = strategy.combine(&scored_lists);
                Ok(fused.into_iter().filter_map(|(id, _)| by_id.get(&id).cloned()).collect())
            }
            _ => unreachable!("leaf plans are handled above"),
        }
    })
}

fn compare_by_key(a: &Item, b: &Item, key: &SortKey) -> Ordering {
    let ordering = match (field_element(a, &key.field), field_element(b, &key.field)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match key.order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

fn field_element(item: &Item, field: &str) -> Option<Element> {
    item.get_field(field).and_then(FieldValue::to_tuple_element)
}

/// Compares two field values the same way the index codec orders them, by
/// packing each as a one-element tuple and comparing the packed bytes —
/// reusing the encoding's own order-preserving guarantee instead of a
/// second hand-rolled comparison.
fn packed_cmp(a: &Element, b: &Element) -> Ordering {
    Tuple::new().push(a.clone()).pack().cmp(&Tuple::new().push(b.clone()).pack())
}

fn evaluate(predicate: &Predicate, item: &Item) -> bool {
    match predicate {
        Predicate::Eq { field, value } => match (item.get_field(field), value.to_tuple_element()) {
            (Some(actual), Some(expected)) => {
                actual.to_tuple_element().map(|a| packed_cmp(&a, &expected) == Ordering::Equal).unwrap_or(false)
            }
            _ => false,
        },
        Predicate::In { field, values } => values.iter().any(|v| evaluate(&Predicate::Eq { field: field.clone(), value: v.clone() }, item)),
        Predicate::Range { field, gt, gte, lt, lte } => {
            let Some(actual) = field_element(item, field) else { return false };
            let above = match (gt, gte) {
                (Some(bound), _) => bound.to_tuple_element().is_some_and(|b| packed_cmp(&actual, &b) == Ordering::Greater),
                (None, Some(bound)) => bound.to_tuple_element().is_some_and(|b| packed_cmp(&actual, &b) != Ordering::Less),
                (None, None) => true,
            };
            let below = match (lt, lte) {
                (Some(bound), _) => bound.to_tuple_element().is_some_and(|b| packed_cmp(&actual, &b) == Ordering::Less),
                (None, Some(bound)) => bound.to_tuple_element().is_some_and(|b| packed_cmp(&actual, &b) != Ordering::Greater),
                (None, None) => true,
            };
            above && below
        }
        // Full-text matching is resolved by the leaf index scan that
        // produced this row; a residual filter here would need the same
        // analyzer/stemmer the fulltext index already applied.
        Predicate::FullText { .. } => true,
        Predicate::And(children) => children.iter().all(|p| evaluate(p, item)),
        Predicate::Or(children) => children.iter().any(|p| evaluate(p, item)),
        Predicate::Not(inner) => !evaluate(inner, item),
        Predicate::MatchAll => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    fn item(id: u64, status: &str) -> Item {
        Item::new(DocId::new(id), "widget").with_field("status", FieldValue::Text(status.to_string()))
    }

    struct StaticLeaves(Vec<Item>);

    #[async_trait]
    impl LeafSource for StaticLeaves {
        async fn fetch(&self, _tx: &dyn Transaction, _plan: &PhysicalPlan) -> Result<Vec<Item>> {
            Ok(self.0.clone())
        }
        async fn fetch_scored(&self, _tx: &dyn Transaction, _plan: &PhysicalPlan, _probe: &VectorProbe) -> Result<Vec<(Item, f64)>> {
            Ok(self.0.iter().cloned().map(|i| (i, 1.0)).collect())
        }
    }

    #[tokio::test]
    async fn filter_drops_rows_that_fail_the_predicate() {
        let leaves = StaticLeaves(vec![item(1, "active"), item(2, "archived")]);
        let plan = PhysicalPlan::Filter {
            predicate: Predicate::Eq { field: "status".into(), value: FieldValue::Text("active".into()) },
            input: Box::new(PhysicalPlan::SeqScan { item_type: "widget".into() }),
        };
        let db = crate::kv::memory::MemoryDatabase::new();
        use crate::kv::Database;
        let tx = db.create_transaction().await.unwrap();
        let rows = execute(&plan, tx.as_ref(), &leaves).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.value(), 1);
    }

    #[tokio::test]
    async fn limit_applies_offset_before_count() {
        let leaves = StaticLeaves(vec![item(1, "a"), item(2, "a"), item(3, "a")]);
        let plan = PhysicalPlan::Limit { n: 1, offset: 1, input: Box::new(PhysicalPlan::SeqScan { item_type: "widget".into() }) };
        let db = crate::kv::memory::MemoryDatabase::new();
        use crate::kv::Database;
        let tx = db.create_transaction().await.unwrap();
        let rows = execute(&plan, tx.as_ref(), &leaves).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.value(), 2);
    }
}
