//! The external KV engine contract (spec §6): everything above this module
//! is written against these traits, never against a concrete storage
//! engine. `memory` is the in-process reference implementation used by
//! tests and as a deployable single-process backend.

pub mod memory;

use async_trait::async_trait;
use std::fmt;

use crate::core::error::{Error, Result};

/// Opaque ordered key. The KV engine never interprets key bytes; ordering is
/// plain byte-lexicographic.
pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

/// A 10-byte placeholder the engine replaces with the commit version.
pub const VERSIONSTAMP_LEN: usize = 10;

pub const MAX_VALUE_SIZE: usize = 100 * 1024;
pub const MAX_TRANSACTION_SIZE: usize = 10 * 1024 * 1024;

/// How a range scan should be fetched from the engine. The core selects one
/// of these per spec §6 "Streaming mode selection" rather than leaving it to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    Exact,
    WantAll,
    Serial,
    Small,
    Iterator,
}

impl StreamingMode {
    /// Implements spec §6's selection rule.
    pub fn select(limit: Option<usize>, estimated_rows: Option<usize>) -> StreamingMode {
        if let Some(limit) = limit {
            if limit <= 100 {
                return StreamingMode::Exact;
            }
        }
        if let Some(rows) = estimated_rows {
            if rows <= 1 {
                return StreamingMode::Small;
            }
            if rows > 10_000 {
                return StreamingMode::Serial;
            }
        }
        if limit.is_none() {
            return StreamingMode::WantAll;
        }
        StreamingMode::Iterator
    }
}

/// A selector into the ordered keyspace: "the key at or after `key`" plus an
/// offset, the standard FoundationDB-style key-selector vocabulary.
#[derive(Debug, Clone)]
pub struct KeySelector {
    pub key: Key,
    pub or_equal: bool,
    pub offset: i32,
}

impl KeySelector {
    pub fn first_greater_or_equal(key: Key) -> Self {
        KeySelector { key, or_equal: true, offset: 0 }
    }

    pub fn first_greater_than(key: Key) -> Self {
        KeySelector { key, or_equal: false, offset: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct RangeOptions {
    pub limit: Option<usize>,
    pub target_bytes: Option<usize>,
    pub streaming_mode: StreamingMode,
    pub reverse: bool,
    pub snapshot: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        RangeOptions {
            limit: None,
            target_bytes: None,
            streaming_mode: StreamingMode::Iterator,
            reverse: false,
            snapshot: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: Key,
    pub value: Value,
}

/// Atomic mutators supported directly by the engine (spec §6 (v)).
#[derive(Debug, Clone)]
pub enum Mutation {
    Set(Value),
    Clear,
    Add(i64),
    Min(Vec<u8>),
    Max(Vec<u8>),
    ByteMin(Vec<u8>),
    ByteMax(Vec<u8>),
    /// Value contains a 10-byte placeholder at `placeholder_offset` which
    /// the engine overwrites with the commit version.
    VersionstampedValue { template: Vec<u8>, placeholder_offset: usize },
}

/// A single logical transaction against the KV engine. Implementations must
/// provide read-your-own-writes within one transaction and serializable
/// isolation across transactions.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    async fn get_range(
        &self,
        begin: KeySelector,
        end: KeySelector,
        options: RangeOptions,
    ) -> Result<Vec<KeyValue>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn clear(&self, key: &[u8]) -> Result<()>;

    fn clear_range(&self, begin: &[u8], end: &[u8]) -> Result<()>;

    fn atomic(&self, key: &[u8], mutation: Mutation) -> Result<()>;

    async fn get_read_version(&self) -> Result<u64>;

    fn set_read_version(&self, version: u64);

    /// Approximate accumulated size of this transaction's writes so far, for
    /// the 9 MB/5 MB batching policy in spec §5.
    fn get_approximate_size(&self) -> usize;

    async fn get_estimated_range_size_bytes(&self, begin: &[u8], end: &[u8]) -> Result<u64>;

    async fn get_range_split_points(
        &self,
        begin: &[u8],
        end: &[u8],
        chunk_size: u64,
    ) -> Result<Vec<Key>>;

    /// Commit the transaction; on conflict returns `Error` with
    /// `ErrorKind::Conflict`, retriable by the transaction runner.
    async fn commit(self: Box<Self>) -> Result<u64>;
}

/// The KV database handle: owned at the container level, shared by every
/// store (spec §5 "Shared resources").
#[async_trait]
pub trait Database: Send + Sync {
    async fn create_transaction(&self) -> Result<Box<dyn Transaction>>;

    async fn get_committed_version(&self) -> Result<u64>;
}

pub(crate) fn check_value_size(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::invalid_argument(format!(
            "value of {} bytes exceeds the {} byte KV engine limit",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

impl fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamingMode::Exact => "exact",
            StreamingMode::WantAll => "want_all",
            StreamingMode::Serial => "serial",
            StreamingMode::Small => "small",
            StreamingMode::Iterator => "iterator",
        };
        write!(f, "{s}")
    }
}
