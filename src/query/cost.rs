//! Cost model (spec §4.9): per-operator cost formulas consulted by the
//! Cascades memo's branch-and-bound search. Generalizes the teacher's
//! `query::types::CostModel` (a handful of constant weights multiplied by
//! result-set size) into the named per-operator formulas spec.md prescribes.

use serde::{Deserialize, Serialize};

/// Per-type row/cardinality estimates the optimizer consults for
/// selectivity (spec §4.9 "Statistics drive selectivity estimates").
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total_rows: u64,
    /// Estimated distinct values per field, used for equality selectivity.
    pub distinct_values: std::collections::HashMap<String, u64>,
}

impl Statistics {
    pub fn equality_selectivity(&self, field: &str) -> f64 {
        match self.distinct_values.get(field) {
            Some(&distinct) if distinct > 0 => 1.0 / distinct as f64,
            _ => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost(pub f64);

impl Cost {
    pub const ZERO: Cost = Cost(0.0);

    pub fn seq_scan(total_rows: u64) -> Cost {
        Cost(total_rows as f64)
    }

    /// `h(range) · selectivity`: `h` approximated as `log2(total_rows)` key
    /// comparisons per range-scan step.
    pub fn index_scan(total_rows: u64, selectivity: f64) -> Cost {
        let h = (total_rows.max(2) as f64).log2();
        Cost(h * selectivity * total_rows as f64)
    }

    pub fn filter(children: Cost) -> Cost {
        Cost(children.0 + 1.0)
    }

    /// Nested-loop join cost, or merge-join cost when both sides already
    /// produce a covering sort order.
    pub fn join(left_rows: f64, right_rows: f64, merge_compatible: bool) -> Cost {
        if merge_compatible {
            Cost(left_rows + right_rows * left_rows.max(2.0).log2())
        } else {
            Cost(left_rows * right_rows)
        }
    }

    pub fn union(children: &[Cost]) -> Cost {
        Cost(children.iter().map(|c| c.0).sum())
    }

    pub fn add(self, other: Cost) -> Cost {
        Cost(self.0 + other.0)
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_scan_cheaper_than_seq_scan_for_selective_predicate() {
        let seq = Cost::seq_scan(1_000_000);
        let idx = Cost::index_scan(1_000_000, 0.0001);
        assert!(idx.0 < seq.0);
    }

    #[test]
    fn merge_join_cheaper_than_nested_loop_for_large_inputs() {
        let nested = Cost::join(10_000.0, 10_000.0, false);
        let merge = Cost::join(10_000.0, 10_000.0, true);
        assert!(merge.0 < nested.0);
    }
}
