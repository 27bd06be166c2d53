//! The maintainer contract every index family implements (spec §4):
//! `indexKeys`, `update`, `validateEntries`, `state`. Dispatched through a
//! plain registry of trait objects rather than a hand-rolled vtable, per
//! the Design Notes' preference for one boundary of dynamic dispatch.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::error::Result;
use crate::core::types::Item;
use crate::kv::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Readable,
    WriteOnly,
    Disabled,
}

impl IndexState {
    pub fn allows_read(&self) -> bool {
        matches!(self, IndexState::Readable)
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, IndexState::Readable | IndexState::WriteOnly)
    }
}

#[derive(Debug, Clone)]
pub struct IndexKv {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub entries_checked: u64,
    pub orphaned_entries: u64,
    pub missing_entries: u64,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_entries == 0 && self.missing_entries == 0
    }
}

/// One maintained index. Implementations own their subspace layout and are
/// entirely responsible for keeping it consistent with the item store.
#[async_trait]
pub trait IndexMaintainer: Send + Sync {
    fn name(&self) -> &str;

    /// The index entries a given item produces, independent of any
    /// transaction — used by both `update` and offline/online build.
    fn index_keys(&self, item: &Item) -> Result<Vec<IndexKv>>;

    /// Downcast hook so the item store can enforce `DeleteRule`s without a
    /// general `dyn Any` dance — only `RelationshipMaintainer` overrides
    /// this.
    fn as_relationship(&self) -> Option<&crate::index::relationship::RelationshipMaintainer> {
        None
    }

    /// Same downcast idiom, for the query executor's leaf source resolving
    /// `IndexScan`/`InJoin`/`InUnion` against a scalar/range index.
    fn as_scalar(&self) -> Option<&crate::index::scalar::ScalarMaintainer> {
        None
    }

    /// Same downcast idiom, for the query executor's leaf source resolving
    /// a `Fusion` source against a vector index.
    fn as_vector(&self) -> Option<&crate::vector::maintainer::VectorMaintainer> {
        None
    }

    /// Apply the delta between `old` (if the item existed) and `new` (if it
    /// still exists after the write) inside `tx`.
    async fn update(
        &self,
        old: Option<&Item>,
        new: Option<&Item>,
        tx: &dyn Transaction,
    ) -> Result<()>;

    async fn validate_entries(&self, tx: &dyn Transaction) -> Result<ValidationReport>;

    fn state(&self) -> IndexState;

    fn set_state(&self, state: IndexState);
}

/// Fans an item-store write out to every maintainer registered for an item
/// type.
#[derive(Default)]
pub struct MaintainerRegistry {
    maintainers: Vec<Arc<dyn IndexMaintainer>>,
}

impl MaintainerRegistry {
    pub fn new() -> Self {
        MaintainerRegistry { maintainers: Vec::new() }
    }

    pub fn register(&mut self, maintainer: Arc<dyn IndexMaintainer>) {
        self.maintainers.push(maintainer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IndexMaintainer>> {
        self.maintainers.iter().find(|m| m.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn IndexMaintainer>] {
        &self.maintainers
    }

    pub async fn update_all(
        &self,
        old: Option<&Item>,
        new: Option<&Item>,
        tx: &dyn Transaction,
    ) -> Result<()> {
        for maintainer in &self.maintainers {
            if maintainer.state().allows_write() {
                maintainer.update(old, new, tx).await?;
            }
        }
        Ok(())
    }
}
