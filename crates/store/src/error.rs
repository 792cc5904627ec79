//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Nothing in here is retried by the store itself: a failed
//! query goes straight back to whoever asked for it.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The store has been closed and can no longer hand out connections.
    #[display("database is closed")]
    Closed,
    /// Another connection kept the write-ahead log from being fully checkpointed.
    #[display("write-ahead log checkpoint was blocked")]
    CheckpointBlocked,
    #[display("entry not found: {_0}")]
    EntryNotFound(#[error(not(source))] String),
    /// A stored value couldn't be converted to or from its model type.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// Schema names are interpolated into SQL, so only plain identifiers pass.
    #[display("invalid schema name: {_0}")]
    InvalidSchema(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CheckpointBlocked)
    }
}
