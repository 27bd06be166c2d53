//! In-memory reference KV engine. Optimistic concurrency control mirrors the
//! teacher's `core::transaction::Transaction` read/write-set validation:
//! each transaction records the keys it read and the version it read them
//! at; commit fails with `Conflict` if any read key was touched by a
//! transaction that committed in the meantime.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::{
    check_value_size, Database, Key, KeySelector, KeyValue, Mutation, RangeOptions, Transaction,
    Value, MAX_TRANSACTION_SIZE, VERSIONSTAMP_LEN,
};
use crate::core::error::{Error, Result};

#[derive(Default)]
struct Store {
    data: BTreeMap<Key, Value>,
    /// version at which each key was last written, for conflict detection.
    write_versions: BTreeMap<Key, u64>,
}

pub struct MemoryDatabase {
    store: Arc<RwLock<Store>>,
    version: Arc<AtomicU64>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        MemoryDatabase { store: Arc::new(RwLock::new(Store::default())), version: Arc::new(AtomicU64::new(1)) }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_transaction(&self) -> Result<Box<dyn Transaction>> {
        let read_version = self.version.load(AtomicOrdering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            store: self.store.clone(),
            version_counter: self.version.clone(),
            read_version: RwLock::new(read_version),
            reads: RwLock::new(Vec::new()),
            writes: RwLock::new(Vec::new()),
            size: AtomicU64::new(0),
        }))
    }

    async fn get_committed_version(&self) -> Result<u64> {
        Ok(self.version.load(AtomicOrdering::SeqCst))
    }
}

enum PendingWrite {
    Set(Key, Value),
    Clear(Key),
    ClearRange(Key, Key),
    Add(Key, i64),
    Min(Key, Vec<u8>),
    Max(Key, Vec<u8>),
    ByteMin(Key, Vec<u8>),
    ByteMax(Key, Vec<u8>),
    Versionstamped(Key, Vec<u8>, usize),
}

struct MemoryTransaction {
    store: Arc<RwLock<Store>>,
    version_counter: Arc<AtomicU64>,
    read_version: RwLock<u64>,
    reads: RwLock<Vec<Key>>,
    writes: RwLock<Vec<PendingWrite>>,
    size: AtomicU64,
}

impl MemoryTransaction {
    fn overlay_get(&self, key: &[u8]) -> Option<Value> {
        // read-your-own-writes: scan pending writes in order, last wins.
        let writes = self.writes.read();
        for w in writes.iter().rev() {
            match w {
                PendingWrite::Set(k, v) if k == key => return Some(v.clone()),
                PendingWrite::Clear(k) if k == key => return None,
                PendingWrite::ClearRange(b, e) if key >= b.as_slice() && key < e.as_slice() => {
                    return None
                }
                _ => {}
            }
        }
        None
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.reads.write().push(key.to_vec());
        if let Some(v) = self.overlay_get(key) {
            return Ok(Some(v));
        }
        Ok(self.store.read().data.get(key).cloned())
    }

    async fn get_range(
        &self,
        begin: KeySelector,
        end: KeySelector,
        options: RangeOptions,
    ) -> Result<Vec<KeyValue>> {
        let begin_key;
        let end_key;
        let mut merged: BTreeMap<Key, Value> = {
            let store = self.store.read();
            begin_key = resolve_selector(&store.data, &begin);
            end_key = resolve_selector(&store.data, &end);
            store
                .data
                .range(begin_key.clone()..end_key.clone())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        // Overlay this transaction's own pending writes, in order, so a
        // range read sees writes issued earlier in the same uncommitted
        // transaction the same way `get` already does via `overlay_get`.
        for w in self.writes.read().iter() {
            match w {
                PendingWrite::Set(k, v) if *k >= begin_key && *k < end_key => {
                    merged.insert(k.clone(), v.clone());
                }
                PendingWrite::Clear(k) if *k >= begin_key && *k < end_key => {
                    merged.remove(k);
                }
                PendingWrite::ClearRange(b, e) => {
                    let lo = if *b > begin_key { b.clone() } else { begin_key.clone() };
                    let hi = if *e < end_key { e.clone() } else { end_key.clone() };
                    if lo < hi {
                        let to_remove: Vec<Key> = merged.range(lo..hi).map(|(k, _)| k.clone()).collect();
                        for k in to_remove {
                            merged.remove(&k);
                        }
                    }
                }
                _ => {}
            }
        }

        let mut results: Vec<KeyValue> =
            merged.into_iter().map(|(key, value)| KeyValue { key, value }).collect();
        if options.reverse {
            results.reverse();
        }
        if let Some(limit) = options.limit {
            results.truncate(limit);
        }
        self.reads.write().push(format!("range:{:?}", begin.key).into_bytes());
        Ok(results)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_value_size(value)?;
        self.size.fetch_add((key.len() + value.len()) as u64, AtomicOrdering::SeqCst);
        if self.size.load(AtomicOrdering::SeqCst) as usize > MAX_TRANSACTION_SIZE {
            return Err(Error::transaction_too_large());
        }
        self.writes.write().push(PendingWrite::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn clear(&self, key: &[u8]) -> Result<()> {
        self.writes.write().push(PendingWrite::Clear(key.to_vec()));
        Ok(())
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) -> Result<()> {
        self.writes
            .write()
            .push(PendingWrite::ClearRange(begin.to_vec(), end.to_vec()));
        Ok(())
    }

    fn atomic(&self, key: &[u8], mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::Set(v) => return self.set(key, &v),
            Mutation::Clear => return self.clear(key),
            Mutation::Add(delta) => self.writes.write().push(PendingWrite::Add(key.to_vec(), delta)),
            Mutation::Min(v) => self.writes.write().push(PendingWrite::Min(key.to_vec(), v)),
            Mutation::Max(v) => self.writes.write().push(PendingWrite::Max(key.to_vec(), v)),
            Mutation::ByteMin(v) => self.writes.write().push(PendingWrite::ByteMin(key.to_vec(), v)),
            Mutation::ByteMax(v) => self.writes.write().push(PendingWrite::ByteMax(key.to_vec(), v)),
            Mutation::VersionstampedValue { template, placeholder_offset } => self
                .writes
                .write()
                .push(PendingWrite::Versionstamped(key.to_vec(), template, placeholder_offset)),
        }
        Ok(())
    }

    async fn get_read_version(&self) -> Result<u64> {
        Ok(*self.read_version.read())
    }

    fn set_read_version(&self, version: u64) {
        *self.read_version.write() = version;
    }

    fn get_approximate_size(&self) -> usize {
        self.size.load(AtomicOrdering::SeqCst) as usize
    }

    async fn get_estimated_range_size_bytes(&self, begin: &[u8], end: &[u8]) -> Result<u64> {
        let store = self.store.read();
        let size: usize = store
            .data
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, v)| k.len() + v.len())
            .sum();
        Ok(size as u64)
    }

    async fn get_range_split_points(
        &self,
        begin: &[u8],
        end: &[u8],
        chunk_size: u64,
    ) -> Result<Vec<Key>> {
        let store = self.store.read();
        let mut points = Vec::new();
        let mut acc = 0u64;
        for (k, v) in store.data.range(begin.to_vec()..end.to_vec()) {
            acc += (k.len() + v.len()) as u64;
            if acc >= chunk_size {
                points.push(k.clone());
                acc = 0;
            }
        }
        Ok(points)
    }

    async fn commit(self: Box<Self>) -> Result<u64> {
        let mut store = self.store.write();

        let read_version = *self.read_version.read();
        for key in self.reads.read().iter() {
            if let Some(&written_at) = store.write_versions.get(key) {
                if written_at > read_version {
                    return Err(Error::conflict("read key modified since transaction began"));
                }
            }
        }

        let commit_version = self.version_counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        for write in self.writes.into_inner() {
            match write {
                PendingWrite::Set(k, v) => {
                    store.write_versions.insert(k.clone(), commit_version);
                    store.data.insert(k, v);
                }
                PendingWrite::Clear(k) => {
                    store.write_versions.insert(k.clone(), commit_version);
                    store.data.remove(&k);
                }
                PendingWrite::ClearRange(b, e) => {
                    let keys: Vec<Key> = store.data.range(b..e).map(|(k, _)| k.clone()).collect();
                    for k in keys {
                        store.write_versions.insert(k.clone(), commit_version);
                        store.data.remove(&k);
                    }
                }
                PendingWrite::Add(k, delta) => {
                    let current = store
                        .data
                        .get(&k)
                        .and_then(|v| v.as_slice().try_into().ok())
                        .map(i64::from_le_bytes)
                        .unwrap_or(0);
                    let updated = current.wrapping_add(delta);
                    store.write_versions.insert(k.clone(), commit_version);
                    store.data.insert(k, updated.to_le_bytes().to_vec());
                }
                PendingWrite::Min(k, v) => {
                    apply_cmp(&mut store, k, v, commit_version, std::cmp::Ordering::Less);
                }
                PendingWrite::Max(k, v) => {
                    apply_cmp(&mut store, k, v, commit_version, std::cmp::Ordering::Greater);
                }
                PendingWrite::ByteMin(k, v) => {
                    apply_byte_cmp(&mut store, k, v, commit_version, true);
                }
                PendingWrite::ByteMax(k, v) => {
                    apply_byte_cmp(&mut store, k, v, commit_version, false);
                }
                PendingWrite::Versionstamped(k, mut template, offset) => {
                    let stamp = versionstamp_bytes(commit_version);
                    if offset + VERSIONSTAMP_LEN <= template.len() {
                        template[offset..offset + VERSIONSTAMP_LEN].copy_from_slice(&stamp);
                    }
                    store.write_versions.insert(k.clone(), commit_version);
                    store.data.insert(k, template);
                }
            }
        }

        Ok(commit_version)
    }
}

fn apply_cmp(store: &mut Store, key: Key, candidate: Vec<u8>, version: u64, want: std::cmp::Ordering) {
    let replace = match store.data.get(&key) {
        None => true,
        Some(existing) => existing.cmp(&candidate) == want,
    };
    if replace {
        store.write_versions.insert(key.clone(), version);
        store.data.insert(key, candidate);
    }
}

fn apply_byte_cmp(store: &mut Store, key: Key, candidate: Vec<u8>, version: u64, want_min: bool) {
    let replace = match store.data.get(&key) {
        None => true,
        Some(existing) => {
            if want_min {
                candidate < *existing
            } else {
                candidate > *existing
            }
        }
    };
    if replace {
        store.write_versions.insert(key.clone(), version);
        store.data.insert(key, candidate);
    }
}

/// A 10-byte opaque, monotone value derived from the commit version.
/// Consumers must never interpret these bytes beyond ordering (spec §9).
fn versionstamp_bytes(version: u64) -> [u8; VERSIONSTAMP_LEN] {
    let mut out = [0u8; VERSIONSTAMP_LEN];
    out[..8].copy_from_slice(&version.to_be_bytes());
    out
}

fn resolve_selector(data: &BTreeMap<Key, Value>, selector: &KeySelector) -> Key {
    // Simplified selector resolution sufficient for the offset values the
    // core actually issues (0 or 1): `or_equal` picks whether the anchor key
    // itself is included.
    if selector.or_equal {
        selector.key.clone()
    } else {
        match data.range(selector.key.clone()..).next() {
            Some((k, _)) if k == &selector.key => {
                let mut next = selector.key.clone();
                next.push(0x00);
                next
            }
            _ => selector.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_read_your_own_write() {
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        tx.set(b"k1", b"v1").unwrap();
        assert_eq!(tx.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        assert_eq!(tx2.get(b"k1").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn conflicting_read_write_aborts_second_commit() {
        let db = MemoryDatabase::new();
        let tx0 = db.create_transaction().await.unwrap();
        tx0.set(b"k1", b"v0").unwrap();
        tx0.commit().await.unwrap();

        let tx1 = db.create_transaction().await.unwrap();
        let _ = tx1.get(b"k1").await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        tx2.set(b"k1", b"v2").unwrap();
        tx2.commit().await.unwrap();

        tx1.set(b"k1", b"v1").unwrap();
        let result = tx1.commit().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn atomic_add_accumulates() {
        let db = MemoryDatabase::new();
        let tx = db.create_transaction().await.unwrap();
        tx.atomic(b"counter", Mutation::Add(5)).unwrap();
        tx.commit().await.unwrap();

        let tx2 = db.create_transaction().await.unwrap();
        tx2.atomic(b"counter", Mutation::Add(3)).unwrap();
        tx2.commit().await.unwrap();

        let tx3 = db.create_transaction().await.unwrap();
        let v = tx3.get(b"counter").await.unwrap().unwrap();
        let n = i64::from_le_bytes(v.try_into().unwrap());
        assert_eq!(n, 8);
    }
}
