//! Query AST (spec §4.8/§4.9). Generalizes the teacher's `query::ast::Query`
//! (term/phrase/bool/range) from "text search expression" to "predicate over
//! any indexed field", keeping the same must/should/must-not/filter boolean
//! shape and adding the vector/fusion/group-by forms this crate's index
//! families need.

use serde::{Deserialize, Serialize};

use crate::core::types::FieldValue;
use crate::query::fusion::FusionStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Eq { field: String, value: FieldValue },
    In { field: String, values: Vec<FieldValue> },
    Range { field: String, gt: Option<FieldValue>, gte: Option<FieldValue>, lt: Option<FieldValue>, lte: Option<FieldValue> },
    FullText { field: String, text: String },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    MatchAll,
}

impl Predicate {
    pub fn and(predicates: Vec<Predicate>) -> Predicate {
        if predicates.len() == 1 {
            predicates.into_iter().next().unwrap()
        } else {
            Predicate::And(predicates)
        }
    }

    /// The equality-bound field prefix this predicate constrains, in
    /// declaration order, used to check whether a compound scalar index
    /// (spec §4.4) can serve it without a residual filter.
    pub fn equality_fields(&self) -> Vec<&str> {
        match self {
            Predicate::Eq { field, .. } => vec![field.as_str()],
            Predicate::And(children) => children.iter().flat_map(|p| p.equality_fields()).collect(),
            _ => Vec::new(),
        }
    }

    /// A stable signature used as part of the plan cache key (spec §4.9).
    pub fn signature(&self) -> String {
        match self {
            Predicate::Eq { field, .. } => format!("eq:{field}"),
            Predicate::In { field, values } => format!("in:{field}:{}", values.len()),
            Predicate::Range { field, gt, gte, lt, lte } => {
                format!("range:{field}:{}{}{}{}", gt.is_some() as u8, gte.is_some() as u8, lt.is_some() as u8, lte.is_some() as u8)
            }
            Predicate::FullText { field, .. } => format!("ft:{field}"),
            Predicate::And(children) => format!("and({})", children.iter().map(Predicate::signature).collect::<Vec<_>>().join(",")),
            Predicate::Or(children) => format!("or({})", children.iter().map(Predicate::signature).collect::<Vec<_>>().join(",")),
            Predicate::Not(inner) => format!("not({})", inner.signature()),
            Predicate::MatchAll => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorProbe {
    pub field: String,
    pub query: Vec<f32>,
    pub k: usize,
}

/// One `fetch`-able query (spec §4.8): a predicate against `item_type`, plus
/// optional sort/limit/offset and, for hybrid search, a set of scored
/// sub-queries combined by a fusion strategy.
#[derive(Debug, Clone)]
pub struct Query {
    pub item_type: String,
    pub predicate: Predicate,
    pub sort: Option<SortKey>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub fusion: Option<(Vec<VectorProbe>, FusionStrategy)>,
}

impl Query {
    pub fn new(item_type: impl Into<String>, predicate: Predicate) -> Self {
        Query { item_type: item_type.into(), predicate, sort: None, limit: None, offset: None, fusion: None }
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(SortKey { field: field.into(), order });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Plan-cache key components (spec §4.9: `(predicateSignature,
    /// sortSignature, projectionSignature)`). Projection is always "whole
    /// item" in this crate (no column pruning), so that signature is
    /// constant.
    pub fn cache_signature(&self) -> (String, String, &'static str) {
        let sort_sig = match &self.sort {
            Some(key) => format!("{}:{:?}", key.field, key.order),
            None => "none".to_string(),
        };
        (self.predicate.signature(), sort_sig, "item")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_of_single_predicate_collapses() {
        let p = Predicate::and(vec![Predicate::Eq { field: "a".into(), value: FieldValue::Int(1) }]);
        assert!(matches!(p, Predicate::Eq { .. }));
    }

    #[test]
    fn equality_fields_collects_across_and() {
        let p = Predicate::And(vec![
            Predicate::Eq { field: "tenant".into(), value: FieldValue::Int(1) },
            Predicate::Eq { field: "status".into(), value: FieldValue::Text("active".into()) },
        ]);
        assert_eq!(p.equality_fields(), vec!["tenant", "status"]);
    }
}
