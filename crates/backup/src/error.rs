//! Backup Error Types
//!
//! Every failure here is fatal to the operation that raised it and is
//! surfaced once, verbatim. Filesystem failures are classified by what the
//! user can do about them (free the file, pick another source, fix
//! permissions) rather than by the call that failed.

use derive_more::{Display, Error};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

/// A backup error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A query against the store failed.
    #[display("store error")]
    Store,
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Another process holds the file.
    #[display("file is locked or in use: {}", _0.display())]
    Locked(#[error(not(source))] PathBuf),
    /// The import source isn't a local path or `file://` URI.
    #[display("unsupported import source: {_0}")]
    UnsupportedSource(#[error(not(source))] String),
    /// The import source exists but isn't a store file.
    #[display("not a library database: {}", _0.display())]
    NotADatabase(#[error(not(source))] PathBuf),
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The export destination rejected the snapshot.
    #[display("export destination error: {_0}")]
    Destination(#[error(not(source))] String),
    /// The operation can't run from the current state.
    #[display("invalid state: {_0}")]
    InvalidState(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked(_) | Self::Io(_) | Self::Destination(_))
    }

    fn from_io(err: &IoError, path: &Path) -> Self {
        match err.kind() {
            IoErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            IoErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            IoErrorKind::ResourceBusy | IoErrorKind::WouldBlock => Self::Locked(path.to_path_buf()),
            _ => Self::Io(path.to_path_buf()),
        }
    }

    /// Classify an I/O error on `path`, keeping the original error in the tree.
    #[track_caller]
    pub(crate) fn io(err: IoError, path: &Path) -> Error {
        let kind = Self::from_io(&err, path);
        exn::Exn::from(err).raise(kind)
    }

    /// Convert a storage backend error, keeping its error tree as a child.
    #[track_caller]
    pub(crate) fn storage(err: shelf_storage::error::Error) -> Error {
        use shelf_storage::error::ErrorKind as StorageErrorKind;
        let kind = match &*err {
            StorageErrorKind::NotFound(path) => Self::NotFound(path.clone()),
            StorageErrorKind::PermissionDenied(path) => Self::PermissionDenied(path.clone()),
            other => Self::Destination(other.to_string()),
        };
        err.raise(kind)
    }
}
