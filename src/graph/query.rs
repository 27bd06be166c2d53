//! Pattern-based triple query builder (spec §4.7): a thin builder over
//! `GraphMaintainer::scan` so callers describe a pattern declaratively
//! instead of juggling three `Option<Element>` positions by hand.

use crate::core::error::Result;
use crate::kv::Transaction;
use crate::tuple::Element;

use super::maintainer::GraphMaintainer;
use super::triple::{Layout, Triple};

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    subject: Option<Element>,
    predicate: Option<Element>,
    object: Option<Element>,
}

impl Pattern {
    pub fn new() -> Self {
        Pattern::default()
    }

    pub fn subject(mut self, value: Element) -> Self {
        self.subject = Some(value);
        self
    }

    pub fn predicate(mut self, value: Element) -> Self {
        self.predicate = Some(value);
        self
    }

    pub fn object(mut self, value: Element) -> Self {
        self.object = Some(value);
        self
    }

    pub async fn run(&self, maintainer: &GraphMaintainer, tx: &dyn Transaction) -> Result<Vec<Triple>> {
        maintainer.scan(tx, self.subject.clone(), self.predicate.clone(), self.object.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DocId, FieldValue, Item};
    use crate::index::maintainer::IndexMaintainer;
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
    async fn pattern_with_only_predicate_bound_matches_every_object() {
        let maintainer = GraphMaintainer::new("follows", "edges", Layout::Hexastore);
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 2)), tx.as_ref()).await.unwrap();
        maintainer.update(None, Some(&item_with_edge(1, "follows", 3)), tx.as_ref()).await.unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        let pattern = Pattern::new().predicate(Element::Text("follows".into()));
        let mut triples = pattern.run(&maintainer, tx2.as_ref()).await.unwrap();
        triples.sort_by_key(|t| match &t.object {
            Element::UInt(u) => *u,
            _ => 0,
        });
        assert_eq!(triples.len(), 2);
    }
}
