//! Cover Cache Error Types
//!
//! Only [`Store`](ErrorKind::Store) ever reaches the caller of a pass. Every
//! other kind describes why a single entry failed and ends up in the pass
//! report instead.

use derive_more::{Display, Error};

/// A cover cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cover cache operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Listing entries or reading/clearing the sync flag failed.
    #[display("store unavailable")]
    Store,
    /// The cache directory couldn't be inspected.
    #[display("cover cache unavailable")]
    Storage,
    /// The entry id can't be turned into a cache file name.
    #[display("entry id is not a valid cache key: {_0}")]
    InvalidId(#[error(not(source))] String),
    #[display("cover download failed")]
    Download,
    /// The source answered in a way another attempt won't change (a bad URL,
    /// a missing image).
    #[display("cover source rejected the request")]
    Rejected,
    #[display("writing the cache file failed")]
    Write,
    #[display("recording the cover location failed")]
    Pointer,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download | Self::Write | Self::Pointer)
    }
}
