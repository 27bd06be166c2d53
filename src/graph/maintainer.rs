//! Graph/triple index maintainer (spec §4.7): extracts `(predicate,
//! object)` edges from a list-valued field, with the item itself as the
//! subject, and persists them in one of three layouts chosen at index
//! declaration (`Layout::{Adjacency,TripleStore,Hexastore}`).

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::types::{FieldValue, Item};
use crate::index::maintainer::{IndexKv, IndexMaintainer, IndexState, ValidationReport};
use crate::kv::{KeySelector, RangeOptions, Transaction};
use crate::tuple::{Element, Subspace, Tuple};

use super::triple::{Layout, Permutation, Triple};

pub struct GraphMaintainer {
    name: String,
    edges_field: String,
    subspace: Subspace,
    layout: Layout,
    state: Mutex<IndexState>,
}

impl GraphMaintainer {
    pub fn new(name: impl Into<String>, edges_field: impl Into<String>, layout: Layout) -> Self {
        let name = name.into();
        let subspace = Subspace::root("I").child(&name);
        GraphMaintainer { name, edges_field: edges_field.into(), subspace, layout, state: Mutex::new(IndexState::Readable) }
    }

    fn edges_of(&self, item: &Item) -> Vec<Triple> {
        let subject = Element::UInt(item.id.value());
        match item.get_field(&self.edges_field) {
            Some(FieldValue::List(entries)) => entries
                .iter()
                .filter_map(|entry| match entry {
                    FieldValue::Struct(fields) => {
                        let predicate = fields.get("predicate")?.to_tuple_element()?;
                        let object = fields.get("object")?.to_tuple_element()?;
                        Some(Triple { subject: subject.clone(), predicate, object })
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn perm_key(&self, perm: Permutation, triple: &Triple) -> Vec<u8> {
        let (a, b, c) = perm.order(triple);
        self.subspace.child(perm.name()).key(&Tuple::new().push(a).push(b).push(c))
    }

    fn out_key(&self, triple: &Triple) -> Vec<u8> {
        self.subspace
            .child("out")
            .key(&Tuple::new().push(triple.predicate.clone()).push(triple.subject.clone()).push(triple.object.clone()))
    }

    fn in_key(&self, triple: &Triple) -> Vec<u8> {
        self.subspace
            .child("in")
            .key(&Tuple::new().push(triple.predicate.clone()).push(triple.object.clone()).push(triple.subject.clone()))
    }

    /// All keys a triple is stored under in this index's layout.
    fn keys_for(&self, triple: &Triple) -> Vec<Vec<u8>> {
        match self.layout {
            Layout::Adjacency => vec![self.out_key(triple), self.in_key(triple)],
            Layout::TripleStore => Permutation::TRIPLE_STORE.iter().map(|p| self.perm_key(*p, triple)).collect(),
            Layout::Hexastore => Permutation::ALL.iter().map(|p| self.perm_key(*p, triple)).collect(),
        }
    }

    /// Scans for triples matching a pattern where `None` means unbound.
    pub async fn scan(
        &self,
        tx: &dyn Transaction,
        subject: Option<Element>,
        predicate: Option<Element>,
        object: Option<Element>,
    ) -> Result<Vec<Triple>> {
        match self.layout {
            Layout::Adjacency => self.scan_adjacency(tx, subject, predicate, object).await,
            Layout::TripleStore => self.scan_permutations(tx, &Permutation::TRIPLE_STORE, subject, predicate, object).await,
            Layout::Hexastore => self.scan_permutations(tx, &Permutation::ALL, subject, predicate, object).await,
        }
    }

    /// Picks the permutation from `available` with the longest bound
    /// prefix, scans it, and filters out any rows whose unbound-in-the-key
    /// positions don't actually match the pattern — a no-op for hexastore
    /// (every pattern prefix-matches exactly) but load-bearing for
    /// `tripleStore`'s narrower permutation set (spec §4.7's "two-stage
    /// scan").
    async fn scan_permutations(
        &self,
        tx: &dyn Transaction,
        available: &[Permutation],
        subject: Option<Element>,
        predicate: Option<Element>,
        object: Option<Element>,
    ) -> Result<Vec<Triple>> {
        let perm = Permutation::best_of(available, subject.is_some(), predicate.is_some(), object.is_some());
        let sub = self.subspace.child(perm.name());
        let ordered: [Option<Element>; 3] = match perm {
            Permutation::Spo => [subject.clone(), predicate.clone(), object.clone()],
            Permutation::Sop => [subject.clone(), object.clone(), predicate.clone()],
            Permutation::Pso => [predicate.clone(), subject.clone(), object.clone()],
            Permutation::Pos => [predicate.clone(), object.clone(), subject.clone()],
            Permutation::Osp => [object.clone(), subject.clone(), predicate.clone()],
            Permutation::Ops => [object.clone(), predicate.clone(), subject.clone()],
        };
        let bound: Vec<Element> = ordered.into_iter().take_while(|v| v.is_some()).map(|v| v.unwrap()).collect();

        let prefix_tuple = Tuple::from_elements(bound);
        let begin = sub.key(&prefix_tuple);
        let mut end = begin.clone();
        end.push(0xFF);

        let rows = tx
            .get_range(KeySelector::first_greater_or_equal(begin), KeySelector::first_greater_or_equal(end), RangeOptions::default())
            .await?;

        let prefix_len = sub.raw_prefix().len();
        let triples: Vec<Triple> = rows
            .into_iter()
            .filter_map(|kv| Tuple::unpack(&kv.key[prefix_len..]).ok())
            .filter_map(|t| match t.0.as_slice() {
                [a, b, c] => Some(unorder(perm, a.clone(), b.clone(), c.clone())),
                _ => None,
            })
            .collect();

        Ok(filter_matching(triples, &subject, &predicate, &object))
    }

    /// Adjacency only ever has two directions to scan: `out` (bound by
    /// predicate+subject) and `in` (bound by predicate+object). Patterns
    /// that don't bind one of those pairs fall back to scanning whichever
    /// direction has the longer bound prefix and filtering in memory.
    async fn scan_adjacency(
        &self,
        tx: &dyn Transaction,
        subject: Option<Element>,
        predicate: Option<Element>,
        object: Option<Element>,
    ) -> Result<Vec<Triple>> {
        let use_out = subject.is_some() || object.is_none();
        let sub_name = if use_out { "out" } else { "in" };
        let ordered: [Option<Element>; 3] = if use_out {
            [predicate.clone(), subject.clone(), object.clone()]
        } else {
            [predicate.clone(), object.clone(), subject.clone()]
        };

        let sub = self.subspace.child(sub_name);
        let bound: Vec<Element> = ordered.into_iter().take_while(|v| v.is_some()).map(|v| v.unwrap()).collect();
        let prefix_tuple = Tuple::from_elements(bound);
        let begin = sub.key(&prefix_tuple);
        let mut end = begin.clone();
        end.push(0xFF);

        let rows = tx
            .get_range(KeySelector::first_greater_or_equal(begin), KeySelector::first_greater_or_equal(end), RangeOptions::default())
            .await?;

        let prefix_len = sub.raw_prefix().len();
        let triples: Vec<Triple> = rows
            .into_iter()
            .filter_map(|kv| Tuple::unpack(&kv.key[prefix_len..]).ok())
            .filter_map(|t| match t.0.as_slice() {
                [p, x, y] if use_out => Some(Triple { subject: x.clone(), predicate: p.clone(), object: y.clone() }),
                [p, x, y] => Some(Triple { subject: y.clone(), predicate: p.clone(), object: x.clone() }),
                _ => None,
            })
            .collect();

        Ok(filter_matching(triples, &subject, &predicate, &object))
    }
}

fn unorder(perm: Permutation, a: Element, b: Element, c: Element) -> Triple {
    match perm {
        Permutation::Spo => Triple { subject: a, predicate: b, object: c },
        Permutation::Sop => Triple { subject: a, predicate: c, object: b },
        Permutation::Pso => Triple { subject: b, predicate: a, object: c },
        Permutation::Pos => Triple { subject: c, predicate: a, object: b },
        Permutation::Osp => Triple { subject: b, predicate: c, object: a },
        Permutation::Ops => Triple { subject: c, predicate: b, object: a },
    }
}

fn filter_matching(
    triples: Vec<Triple>,
    subject: &Option<Element>,
    predicate: &Option<Element>,
    object: &Option<Element>,
) -> Vec<Triple> {
    triples
        .into_iter()
        .filter(|t| {
            subject.as_ref().is_none_or(|s| s == &t.subject)
                && predicate.as_ref().is_none_or(|p| p == &t.predicate)
                && object.as_ref().is_none_or(|o| o == &t.object)
        })
        .collect()
}

#[async_trait]
impl IndexMaintainer for GraphMaintainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>> {
        let triples = self.edges_of(item);
        let mut out = Vec::new();
        for triple in &triples {
            for key in self.keys_for(triple) {
                out.push(IndexKv { key, value: Vec::new() });
            }
        }
        Ok(out)
    }

    async fn update(&self, old: Option<&Item>, new: Option<&Item>, tx: &dyn Transaction) -> Result<()> {
        if let Some(old) = old {
            for triple in self.edges_of(old) {
                for key in self.keys_for(&triple) {
                    tx.clear(&key)?;
                }
            }
        }
        if let Some(new) = new {
            for triple in self.edges_of(new) {
                for key in self.keys_for(&triple) {
                    tx.set(&key, &[])?;
                }
            }
        }
        Ok(())
    }

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport> {
        let sub_name = match self.layout {
            Layout::Adjacency => "out",
            Layout::TripleStore | Layout::Hexastore => Permutation::Spo.name(),
        };
        let sub = self.subspace.child(sub_name);
        let rows = tx
            .get_range(
                KeySelector::first_greater_or_equal(sub.raw_prefix().to_vec()),
                KeySelector::first_greater_or_equal(sub.range_end()),
                RangeOptions::default(),
            )
            .await?;
        Ok(ValidationReport { entries_checked: rows.len() as u64, orphaned_entries: 0, missing_entries: 0 })
    }

    fn state(&self) -> IndexState {
        *self.state.lock()
    }

    fn set_state(&self, state: IndexState) {
        *self.state.lock() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use crate::kv::memory::MemoryDatabase;
    use crate::kv::Database;
    use std::collections::HashMap;

    fn item_with_edge(id: u64, predicate: &str, object: u64) -> Item {
        let mut edge = HashMap::new();
        edge.insert("predicate".to_string(), FieldValue::Text(predicate.to_string()));
        edge.insert("object".to_string(), FieldValue::UInt(object));
        Item::new(DocId::new(id), "node").with_field("edges", FieldValue::List(vec![FieldValue::Struct(edge)]))
    }

    #[tokio::test]
    async fn scan_by_predicate_and_object_finds_subject() {
        let maintainer = GraphMaintainer::new("follows", "edges", Layout::Hexastore);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 2)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let triples = maintainer
            .scan(tx2.as_ref(), None, Some(Element::Text("follows".into())), Some(Element::UInt(2)))
            .await
            .unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].subject, Element::UInt(1));
    }

    #[tokio::test]
    async fn adjacency_layout_resolves_forward_and_backward_traversal() {
        let maintainer = GraphMaintainer::new("follows", "edges", Layout::Adjacency);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 2)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let forward = maintainer
            .scan(tx2.as_ref(), Some(Element::UInt(1)), Some(Element::Text("follows".into())), None)
            .await
            .unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].object, Element::UInt(2));

        let backward = maintainer
            .scan(tx2.as_ref(), None, Some(Element::Text("follows".into())), Some(Element::UInt(2)))
            .await
            .unwrap();
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].subject, Element::UInt(1));
    }

    #[tokio::test]
    async fn triple_store_layout_answers_subject_and_object_bound_pattern_via_filtering() {
        let maintainer = GraphMaintainer::new("follows", "edges", Layout::TripleStore);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 2)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 3)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        // Bound on subject+object with no predicate doesn't prefix-match
        // any of SPO/POS/OSP past the first element, forcing the in-memory
        // filter pass to do the rest.
        let tx2 = db.create_transaction().await.unwrap();
        let triples =
            maintainer.scan(tx2.as_ref(), Some(Element::UInt(1)), None, Some(Element::UInt(2))).await.unwrap();
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].object, Element::UInt(2));
    }
}
