/// Error taxonomy for the breakdown engine.
///
/// Malformed log lines never reach this type: the aggregator recovers from
/// them locally and skips the line. What surfaces here is either a caller/data
/// inconsistency (`UnknownUnit`) or a failure of an outer collaborator
/// (persistence store, JSON codec, filesystem).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Neither the unit table nor the name table knows this identifier.
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("cache store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
