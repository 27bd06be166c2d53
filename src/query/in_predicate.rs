//! IN-predicate planning (spec §4.9): choosing between IN-Join, IN-Union,
//! and scan-and-filter for a field-equality list, mirroring the index
//! union/intersection handling the teacher's `planner.rs` gives
//! `LogicalPlan::Union`/`Intersection`, but decided by the value-count rule
//! spec.md names rather than always unioning.

use crate::query::ast::SortKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InStrategy {
    /// One index lookup per value, joined back to the base relation —
    /// cheap when there are few values and no ordering requirement.
    Join,
    /// One ordered index scan per value, merged into a single output order
    /// — used when the caller needs results in index order and a bounded
    /// result count.
    Union,
    /// Fall back to a full scan with a residual `IN` filter.
    ScanAndFilter,
}

/// `n <= 20` with no conflicting sort requirement favors `Join`; an ordering
/// requirement the index already satisfies favors a merged `Union` capped by
/// `limit`; anything else (huge value lists, no usable index) falls back to
/// `ScanAndFilter`.
pub fn choose_strategy(value_count: usize, has_usable_index: bool, required_sort: &Option<SortKey>, limit: Option<usize>) -> InStrategy {
    if !has_usable_index {
        return InStrategy::ScanAndFilter;
    }
    if value_count == 0 {
        return InStrategy::ScanAndFilter;
    }
    if required_sort.is_some() && limit.is_some() {
        return InStrategy::Union;
    }
    if value_count <= 20 {
        InStrategy::Join
    } else if limit.is_some() {
        InStrategy::Union
    } else {
        InStrategy::ScanAndFilter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_value_list_without_sort_requirement_uses_join() {
        let strategy = choose_strategy(5, true, &None, None);
        assert_eq!(strategy, InStrategy::Join);
    }

    #[test]
    fn sort_requirement_with_limit_uses_union() {
        let sort = Some(SortKey { field: "created_at".into(), order: crate::query::ast::SortOrder::Descending });
        let strategy = choose_strategy(5, true, &sort, Some(10));
        assert_eq!(strategy, InStrategy::Union);
    }

    #[test]
    fn large_value_list_with_no_limit_falls_back_to_scan() {
        let strategy = choose_strategy(500, true, &None, None);
        assert_eq!(strategy, InStrategy::ScanAndFilter);
    }

    #[test]
    fn missing_index_always_falls_back_to_scan() {
        let strategy = choose_strategy(3, false, &None, None);
        assert_eq!(strategy, InStrategy::ScanAndFilter);
    }
}
