//! Query planning (spec §4.8/§4.9): predicate AST, cost model, Cascades
//! memo and rules, plan cache, fusion, and IN-predicate strategy selection.
//! `optimize` is the single entry point `exec` calls to turn a `Query` into
//! a `PhysicalPlan`.

pub mod ast;
pub mod cache;
pub mod cost;
pub mod fusion;
pub mod in_predicate;
pub mod memo;
pub mod plan;
pub mod rules;

pub use ast::{Predicate, Query, SortKey, SortOrder, VectorProbe};
pub use cache::{CacheStats, PlanCache};
pub use cost::{Cost, Statistics};
pub use fusion::{FusionStrategy, Normalization};
pub use in_predicate::InStrategy;
pub use memo::{AvailableIndex, Budget, GroupId, LogicalExpr, Memo, PlanningContext};
pub use plan::PhysicalPlan;

use crate::core::error::Result;
use rules::TransformationRule;

/// Search-planning limits (spec §4.9's complexity caps), taken from
/// `Config` by the caller rather than read directly here to keep this
/// module free of a dependency on `core::config`.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerLimits {
    pub max_plan_enumerations: usize,
    pub max_rule_applications: usize,
}

/// Builds the memo for `query` and returns its cheapest physical plan.
/// Applies the transformation rules once before costing — this crate's
/// predicate trees are shallow enough that a single simplification pass
/// reaches a fixed point in practice; deeply nested predicates would need
/// `rules::PredicateSimplifyRule` applied to a worklist until no rewrite
/// fires.
pub fn optimize(query: &Query, ctx: &PlanningContext, limits: OptimizerLimits) -> Result<PhysicalPlan> {
    let mut memo = Memo::new();

    let scan = memo.insert(LogicalExpr::Scan { item_type: query.item_type.clone() });
    if let Some(index) = rules::matching_index(ctx.indexes, &query.predicate) {
        memo.add_equivalent(scan, LogicalExpr::IndexSeek { index: index.name.clone(), fields: index.fields.clone() });
    }

    let mut current = scan;
    if !matches!(query.predicate, Predicate::MatchAll) {
        current = memo.insert(LogicalExpr::Filter { predicate: query.predicate.clone(), input: current });
    }

    let simplify_rule = rules::PredicateSimplifyRule;
    for rewritten in simplify_rule.apply(&mut memo, current) {
        memo.add_equivalent(current, rewritten);
    }

    if let Some(sort) = &query.sort {
        current = memo.insert(LogicalExpr::Sort { key: sort.clone(), input: current });
    }
    if let Some(limit) = query.limit {
        current = memo.insert(LogicalExpr::Limit { n: limit, offset: query.offset.unwrap_or(0), input: current });
    }

    let mut budget = Budget::new(limits.max_plan_enumerations, limits.max_rule_applications);
    let required = query.sort.clone();
    rules::implement_group(&mut memo, &mut budget, current, &required, ctx)?;
    rules::implement_group(&mut memo, &mut budget, current, &None, ctx)?;

    memo.winner(current, &required)
        .or_else(|| memo.winner(current, &None))
        .map(|winner| winner.plan.clone())
        .ok_or_else(|| crate::core::error::Error::plan_complexity_exceeded("no physical plan produced"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldValue;

    #[test]
    fn optimize_picks_index_scan_when_an_index_covers_the_equality() {
        let predicate = Predicate::Eq { field: "sku".into(), value: FieldValue::Text("A1".into()) };
        let query = Query::new("widget", predicate);
        let stats = Statistics { total_rows: 1_000_000, distinct_values: [("sku".to_string(), 1_000_000)].into_iter().collect() };
        let indexes = vec![AvailableIndex { name: "by_sku".into(), fields: vec!["sku".into()] }];
        let ctx = PlanningContext { statistics: &stats, indexes: &indexes };
        let limits = OptimizerLimits { max_plan_enumerations: 10_000, max_rule_applications: 50_000 };

        let plan = optimize(&query, &ctx, limits).unwrap();
        assert!(plan.describe().contains("IndexScan") || plan.describe().contains("Filter(IndexScan"));
    }

    #[test]
    fn optimize_falls_back_to_seq_scan_without_a_matching_index() {
        let predicate = Predicate::Eq { field: "unindexed".into(), value: FieldValue::Int(1) };
        let query = Query::new("widget", predicate);
        let stats = Statistics::default();
        let ctx = PlanningContext { statistics: &stats, indexes: &[] };
        let limits = OptimizerLimits { max_plan_enumerations: 10_000, max_rule_applications: 50_000 };

        let plan = optimize(&query, &ctx, limits).unwrap();
        assert!(plan.describe().contains("SeqScan"));
    }
}
