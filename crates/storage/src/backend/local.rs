//! Local filesystem storage backend.
//!
//! Files are stored under a configured root directory and accessed with
//! `tokio::fs`.

use crate::error::{ErrorKind, Result};
use crate::{FileInfo, StorageBackend, path::validate as validate_path};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use shelf_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let covers = LocalBackend::new("covers", "/home/me/.local/share/shelf/covers")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute or exists but isn't a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Runs once at startup; not worth making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn ensure_parent(&self, absolute: &Path, relative: &Path) -> Result<()> {
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, relative))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn locate(&self, path: &Path) -> Result<PathBuf> {
        self.absolute_path(path)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        self.ensure_parent(&abs_path, path).await?;
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        self.ensure_parent(&to_path, to).await?;
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, from))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("covers", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("covers", "relative/path").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/covers");
        LocalBackend::new("covers", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(LocalBackend::new("covers", &file).is_err());
    }

    #[test]
    fn test_locate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        assert_eq!(backend.locate(Path::new("abc.jpg")).unwrap(), temp_dir.path().join("abc.jpg"));
        assert!(backend.locate(Path::new("../abc.jpg")).is_err());
    }

    #[tokio::test]
    async fn test_write_read_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        assert!(!backend.exists(Path::new("abc.jpg")).await.unwrap());
        backend.write(Path::new("abc.jpg"), b"\xff\xd8\xff").await.unwrap();
        assert!(backend.exists(Path::new("abc.jpg")).await.unwrap());
        assert_eq!(backend.read(Path::new("abc.jpg")).await.unwrap(), b"\xff\xd8\xff");
    }

    #[tokio::test]
    async fn test_exists_after_external_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        backend.write(Path::new("abc.jpg"), b"data").await.unwrap();
        std::fs::remove_file(temp_dir.path().join("abc.jpg")).unwrap();
        assert!(!backend.exists(Path::new("abc.jpg")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        let err = backend.delete(Path::new("missing.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        backend.write(Path::new("abc.jpg"), b"old").await.unwrap();
        backend.write(Path::new("abc.jpg.part"), b"new").await.unwrap();
        backend.rename(Path::new("abc.jpg.part"), Path::new("abc.jpg")).await.unwrap();
        assert!(!backend.exists(Path::new("abc.jpg.part")).await.unwrap());
        assert_eq!(backend.read(Path::new("abc.jpg")).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_stat() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("exports", temp_dir.path()).unwrap();
        backend.write(Path::new("library_backup.db"), b"SQLite format 3\0").await.unwrap();
        let info = backend.stat(Path::new("library_backup.db")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("library_backup.db"));
        assert_eq!(info.size, 16);
        assert!(!info.is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("covers", temp_dir.path()).unwrap();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.jpg"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
