//! Top-level subspace layout (spec §3): `R` items, `I` indexes, `T` index
//! state, `M` metadata, `B` blob chunks, `O` ontology.

use crate::tuple::Subspace;

pub struct Subspaces {
    pub items: Subspace,
    pub indexes: Subspace,
    pub index_state: Subspace,
    pub metadata: Subspace,
    pub blobs: Subspace,
    pub ontology: Subspace,
}

impl Subspaces {
    pub fn new() -> Self {
        Subspaces {
            items: Subspace::root("R"),
            indexes: Subspace::root("I"),
            index_state: Subspace::root("T"),
            metadata: Subspace::root("M"),
            blobs: Subspace::root("B"),
            ontology: Subspace::root("O"),
        }
    }

    pub fn index(&self, name: &str) -> Subspace {
        self.indexes.child(name)
    }

    pub fn index_state_for(&self, name: &str) -> Subspace {
        self.index_state.child(name)
    }

    pub fn items_for_type(&self, type_name: &str) -> Subspace {
        self.items.child(type_name)
    }

    /// `DocId -> primary key tuple` lookup, maintained by `ItemStore`
    /// alongside every insert/delete so callers that only have an index
    /// maintainer's doc id (every index keys by `Item::id`, not by the
    /// item's primary key) can still resolve the full item.
    pub fn doc_index_for(&self, type_name: &str) -> Subspace {
        self.metadata.child(type_name).child("by_doc_id")
    }
}

impl Default for Subspaces {
    fn default() -> Self {
        Self::new()
    }
}
