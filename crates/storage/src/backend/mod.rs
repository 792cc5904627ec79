//! Storage backend trait and implementations.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unified interface for storage backends.
///
/// All paths are relative to the backend root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation before use.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::{StorageBackend, error::Result};
///
/// async fn cached_size(backend: &dyn StorageBackend, id: &str) -> Result<u64> {
///     let key = format!("{id}.jpg");
///     match backend.exists(Path::new(&key)).await? {
///         true => Ok(backend.stat(Path::new(&key)).await?.size),
///         false => Ok(0),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging.
    fn name(&self) -> &str;

    /// Resolve a storage path to the location other components (image
    /// renderers, the relational store) use to refer to it.
    ///
    /// Does not touch the backend; the file does not need to exist.
    fn locate(&self, path: &Path) -> Result<PathBuf>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents.
    ///
    /// Creates a new file or overwrites an existing one. Implementations
    /// create parent directories as needed. A failed write may leave a partial
    /// file behind; callers that care stage the write and [`rename`](Self::rename).
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Rename/move a file within the same backend, overwriting the destination.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the source
    /// file does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
