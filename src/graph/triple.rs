//! Triple layout (spec §4.7): a hexastore keeps all six permutations of
//! subject/predicate/object so any pattern with at least one bound
//! position resolves to a single prefix scan.

use crate::tuple::Element;

#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub subject: Element,
    pub predicate: Element,
    pub object: Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permutation {
    Spo,
    Sop,
    Pso,
    Pos,
    Osp,
    Ops,
}

/// Graph index layout (spec §4.7), chosen at index declaration. Trades key
/// count against which bound-position patterns resolve to a single prefix
/// scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 2 keys per edge (`out/<edge>/<from>/<to>`, `in/<edge>/<to>/<from>`):
    /// cheap forward/backward traversal, nothing else.
    Adjacency,
    /// 3 keys (SPO/POS/OSP): covers every basic pattern; a pattern whose
    /// bound positions don't prefix-match the chosen permutation costs an
    /// extra in-memory filter pass over the scanned rows.
    TripleStore,
    /// 6 keys, one per permutation: every basic pattern is a plain prefix
    /// scan with no extra filtering.
    Hexastore,
}

impl Permutation {
    pub const ALL: [Permutation; 6] =
        [Permutation::Spo, Permutation::Sop, Permutation::Pso, Permutation::Pos, Permutation::Osp, Permutation::Ops];

    pub const TRIPLE_STORE: [Permutation; 3] = [Permutation::Spo, Permutation::Pos, Permutation::Osp];

    pub fn name(&self) -> &'static str {
        match self {
            Permutation::Spo => "spo",
            Permutation::Sop => "sop",
            Permutation::Pso => "pso",
            Permutation::Pos => "pos",
            Permutation::Osp => "osp",
            Permutation::Ops => "ops",
        }
    }

    /// Orders `(subject, predicate, object)` the way this permutation packs
    /// them into a key.
    pub fn order(&self, triple: &Triple) -> (Element, Element, Element) {
        let (s, p, o) = (triple.subject.clone(), triple.predicate.clone(), triple.object.clone());
        match self {
            Permutation::Spo => (s, p, o),
            Permutation::Sop => (s, o, p),
            Permutation::Pso => (p, s, o),
            Permutation::Pos => (p, o, s),
            Permutation::Osp => (o, s, p),
            Permutation::Ops => (o, p, s),
        }
    }

    /// Picks the permutation from `available` whose key order has the
    /// longest leading run of bound positions — the longer the run, the
    /// more of the scan a prefix match prunes. Ties keep the first
    /// candidate in `available`, so callers list their preferred
    /// permutation first.
    pub fn best_of(available: &[Permutation], subject_bound: bool, predicate_bound: bool, object_bound: bool) -> Permutation {
        let bound_prefix_len = |perm: &Permutation| -> usize {
            let positions = match perm {
                Permutation::Spo => [subject_bound, predicate_bound, object_bound],
                Permutation::Sop => [subject_bound, object_bound, predicate_bound],
                Permutation::Pso => [predicate_bound, subject_bound, object_bound],
                Permutation::Pos => [predicate_bound, object_bound, subject_bound],
                Permutation::Osp => [object_bound, subject_bound, predicate_bound],
                Permutation::Ops => [object_bound, predicate_bound, subject_bound],
            };
            positions.iter().take_while(|bound| **bound).count()
        };
        available
            .iter()
            .copied()
            .max_by_key(|perm| bound_prefix_len(perm))
            .unwrap_or(Permutation::Spo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_of_picks_predicate_object_first_permutation() {
        let perm = Permutation::best_of(&Permutation::ALL, false, true, true);
        assert_eq!(perm, Permutation::Pos);
    }

    #[test]
    fn best_of_falls_back_when_preferred_permutation_unavailable() {
        // Only SPO/POS/OSP exist; a subject+object-bound pattern can't
        // prefix-match any of them past the first element, so the tie goes
        // to the first candidate listed.
        let perm = Permutation::best_of(&Permutation::TRIPLE_STORE, true, false, true);
        assert_eq!(perm, Permutation::Spo);
    }
}
