//! Physical plan shapes (spec §4.9/§4.10): the optimizer's output tree,
//! consumed by `exec::operators`. Kept separate from the logical `ast`/memo
//! types so a physical plan can be cached and replayed without re-planning.

use crate::query::ast::{Predicate, SortKey, VectorProbe};
use crate::query::fusion::FusionStrategy;

#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    SeqScan { item_type: String },
    IndexScan { index: String, equality_prefix: Vec<(String, crate::core::types::FieldValue)>, range: Option<Predicate> },
    Filter { predicate: Predicate, input: Box<PhysicalPlan> },
    Sort { key: SortKey, input: Box<PhysicalPlan> },
    Limit { n: usize, offset: usize, input: Box<PhysicalPlan> },
    InJoin { index: String, field: String, values: Vec<crate::core::types::FieldValue>, input_template: Box<PhysicalPlan> },
    InUnion { index: String, field: String, values: Vec<crate::core::types::FieldValue> },
    Fusion { sources: Vec<(PhysicalPlan, VectorProbe)>, strategy: FusionStrategy, candidates_per_source: usize },
    AggregationLookup { index: String, group_prefix: Vec<crate::core::types::FieldValue> },
}

impl PhysicalPlan {
    /// A human-readable one-line summary, used in tests and debugging —
    /// never parsed back.
    pub fn describe(&self) -> String {
        match self {
            PhysicalPlan::SeqScan { item_type } => format!("SeqScan({item_type})"),
            PhysicalPlan::IndexScan { index, .. } => format!("IndexScan({index})"),
            PhysicalPlan::Filter { input, .. } => format!("Filter({})", input.describe()),
            PhysicalPlan::Sort { input, .. } => format!("Sort({})", input.describe()),
            PhysicalPlan::Limit { input, .. } => format!("Limit({})", input.describe()),
            PhysicalPlan::InJoin { index, values, .. } => format!("InJoin({index}, n={})", values.len()),
            PhysicalPlan::InUnion { index, values, .. } => format!("InUnion({index}, n={})", values.len()),
            PhysicalPlan::Fusion { sources, .. } => format!("Fusion({})", sources.len()),
            PhysicalPlan::AggregationLookup { index, .. } => format!("AggregationLookup({index})"),
        }
    }
}
