//! Unified error taxonomy (spec §7). Every fallible operation in this crate
//! returns `Result<T>`; `Error::is_retriable` drives the transaction
//! runner's retry loop.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("transaction too large: {0}")]
    TransactionTooLarge(String),

    #[error("value is not an envelope (missing magic): {0}")]
    NotEnvelope(String),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("missing split part: {0}")]
    MissingSplitPart(String),

    #[error("uniqueness violation on {index}: value {value} already used by {conflicting_id}")]
    UniquenessViolation { index: String, value: String, conflicting_id: String },

    #[error("index state error: {0}")]
    IndexStateError(String),

    #[error("format version incompatible: {0}")]
    FormatVersionIncompatible(String),

    #[error("schema evolution violation: {0}")]
    SchemaEvolutionViolation(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("plan complexity exceeded: {0}")]
    PlanComplexityExceeded(String),

    #[error("quantizer not trained: {0}")]
    QuantizerNotTrained(String),

    #[error("codebook corrupted: {0}")]
    CodebookCorrupted(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("KV engine error: {0}")]
    Kv(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Retriability per the spec §7 table. Only `Conflict`/`Timeout` are
    /// recovered transparently by the transaction runner; everything else
    /// propagates to the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Timeout(_))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    pub fn transaction_too_large() -> Self {
        Error::TransactionTooLarge(
            "approximate transaction size exceeds the KV engine limit".into(),
        )
    }

    pub fn not_envelope(msg: impl Into<String>) -> Self {
        Error::NotEnvelope(msg.into())
    }

    pub fn checksum_mismatch(msg: impl Into<String>) -> Self {
        Error::ChecksumMismatch(msg.into())
    }

    pub fn missing_split_part(base_key: impl std::fmt::Debug) -> Self {
        Error::MissingSplitPart(format!("{base_key:?}"))
    }

    pub fn uniqueness_violation(
        index: impl Into<String>,
        value: impl Into<String>,
        conflicting_id: impl Into<String>,
    ) -> Self {
        Error::UniquenessViolation {
            index: index.into(),
            value: value.into(),
            conflicting_id: conflicting_id.into(),
        }
    }

    pub fn index_state(msg: impl Into<String>) -> Self {
        Error::IndexStateError(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Error::AccessDenied(msg.into())
    }

    pub fn plan_complexity_exceeded(msg: impl Into<String>) -> Self {
        Error::PlanComplexityExceeded(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
