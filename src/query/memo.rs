//! Cascades-style memo (spec §4.9): groups of logically equivalent
//! expressions, searched top-down with cost-based pruning. Generalizes the
//! teacher's `query::planner::LogicalPlan` enum (`Scan, IndexSeek, Filter,
//! Sort, Limit, Union, Intersection, Difference`) from a single fixed tree
//! into a memo that can hold several equivalent rewrites per group and pick
//! the cheapest one for each required physical property.

use std::collections::HashMap;

use crate::core::error::{Error, Result};
use crate::query::ast::{Predicate, SortKey};
use crate::query::cost::{Cost, Statistics};
use crate::query::plan::PhysicalPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

/// A logical expression: an operator over child groups rather than child
/// plans, so rewrites of a child are automatically visible to every parent.
#[derive(Debug, Clone)]
pub enum LogicalExpr {
    Scan { item_type: String },
    IndexSeek { index: String, fields: Vec<String> },
    Filter { predicate: Predicate, input: GroupId },
    Sort { key: SortKey, input: GroupId },
    Limit { n: usize, offset: usize, input: GroupId },
}

/// Required physical property a consumer imposes on a group: currently just
/// an optional sort order, matching the only physical property this crate's
/// operators care about (spec §4.10 merge-compatible inputs).
pub type RequiredProperty = Option<SortKey>;

#[derive(Debug, Clone)]
pub struct Winner {
    pub plan: PhysicalPlan,
    pub cost: Cost,
}

#[derive(Debug, Default)]
pub struct Group {
    pub exprs: Vec<LogicalExpr>,
    pub winners: HashMap<String, Winner>,
}

impl Group {
    fn property_key(property: &RequiredProperty) -> String {
        match property {
            Some(key) => format!("{}:{:?}", key.field, key.order),
            None => "none".to_string(),
        }
    }
}

/// Bookkeeping caps mirroring `Config::max_plan_enumerations` /
/// `max_rule_applications` (spec §4.9): the search fails closed with
/// `Error::PlanComplexityExceeded` rather than running away.
pub struct Budget {
    pub max_enumerations: usize,
    pub max_rule_applications: usize,
    enumerations: usize,
    rule_applications: usize,
}

impl Budget {
    pub fn new(max_enumerations: usize, max_rule_applications: usize) -> Self {
        Budget { max_enumerations, max_rule_applications, enumerations: 0, rule_applications: 0 }
    }

    pub fn charge_enumeration(&mut self) -> Result<()> {
        self.enumerations += 1;
        if self.enumerations > self.max_enumerations {
            return Err(Error::plan_complexity_exceeded(format!(
                "exceeded max_plan_enumerations ({})",
                self.max_enumerations
            )));
        }
        Ok(())
    }

    pub fn charge_rule(&mut self) -> Result<()> {
        self.rule_applications += 1;
        if self.rule_applications > self.max_rule_applications {
            return Err(Error::plan_complexity_exceeded(format!(
                "exceeded max_rule_applications ({})",
                self.max_rule_applications
            )));
        }
        Ok(())
    }
}

pub struct Memo {
    groups: Vec<Group>,
}

impl Memo {
    pub fn new() -> Self {
        Memo { groups: Vec::new() }
    }

    pub fn insert(&mut self, expr: LogicalExpr) -> GroupId {
        let id = GroupId(self.groups.len());
        self.groups.push(Group { exprs: vec![expr], winners: HashMap::new() });
        id
    }

    pub fn add_equivalent(&mut self, group: GroupId, expr: LogicalExpr) {
        self.groups[group.0].exprs.push(expr);
    }

    pub fn exprs(&self, group: GroupId) -> &[LogicalExpr] {
        &self.groups[group.0].exprs
    }

    pub fn record_winner(&mut self, group: GroupId, property: &RequiredProperty, plan: PhysicalPlan, cost: Cost) {
        let key = Group::property_key(property);
        let slot = self.groups[group.0].winners.entry(key).or_insert_with(|| Winner { plan: plan.clone(), cost });
        if cost.0 < slot.cost.0 {
            *slot = Winner { plan, cost };
        }
    }

    pub fn winner(&self, group: GroupId, property: &RequiredProperty) -> Option<&Winner> {
        self.groups[group.0].winners.get(&Group::property_key(property))
    }
}

/// Per-index metadata the memo consults to decide whether a field-equality
/// prefix is covered by an index without a residual filter (spec §4.4).
#[derive(Debug, Clone)]
pub struct AvailableIndex {
    pub name: String,
    pub fields: Vec<String>,
}

impl AvailableIndex {
    pub fn covers_prefix(&self, fields: &[&str]) -> bool {
        !fields.is_empty() && self.fields.iter().zip(fields.iter()).all(|(a, b)| a == b)
    }
}

pub struct PlanningContext<'a> {
    pub statistics: &'a Statistics,
    pub indexes: &'a [AvailableIndex],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_keeps_cheapest_plan_for_a_property() {
        let mut memo = Memo::new();
        let group = memo.insert(LogicalExpr::Scan { item_type: "widget".into() });
        memo.record_winner(group, &None, PhysicalPlan::SeqScan { item_type: "widget".into() }, Cost(100.0));
        memo.record_winner(
            group,
            &None,
            PhysicalPlan::IndexScan { index: "by_sku".into(), equality_prefix: vec![], range: None },
            Cost(5.0),
        );
        let winner = memo.winner(group, &None).unwrap();
        assert_eq!(winner.cost.0, 5.0);
        assert!(matches!(winner.plan, PhysicalPlan::IndexScan { .. }));
    }

    #[test]
    fn budget_rejects_past_the_enumeration_cap() {
        let mut budget = Budget::new(2, 100);
        assert!(budget.charge_enumeration().is_ok());
        assert!(budget.charge_enumeration().is_ok());
        assert!(budget.charge_enumeration().is_err());
    }
}
