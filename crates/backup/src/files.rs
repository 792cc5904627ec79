//! Store file handling.
//!
//! A store on disk is more than one file: in write-ahead-log mode SQLite keeps
//! `-wal` and `-shm` files next to it, and a rollback journal may be left
//! behind after a crash. Whatever happens to the main file happens to these.

use crate::error::{ErrorKind, Result};
use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

const SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

pub(crate) fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) async fn exists(path: &Path) -> Result<bool> {
    fs::try_exists(path).await.map_err(|e| ErrorKind::io(e, path))
}

/// Best effort: only logs what it couldn't remove.
pub(crate) async fn remove_sidecars(path: &Path) {
    for suffix in SIDECARS {
        let sidecar = sidecar(path, suffix);
        match fs::remove_file(&sidecar).await {
            Ok(()) => tracing::debug!(path = %sidecar.display(), "Removed sidecar"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {},
            Err(e) => tracing::warn!(path = %sidecar.display(), error = %e, "Couldn't remove sidecar"),
        }
    }
}

/// Delete a store file and its sidecars. A store that doesn't exist is
/// already deleted.
pub(crate) async fn remove_store(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == IoErrorKind::NotFound => {},
        Err(e) => return Err(ErrorKind::io(e, path)),
    }
    for suffix in SIDECARS {
        let sidecar = sidecar(path, suffix);
        match fs::remove_file(&sidecar).await {
            Ok(()) => {},
            Err(e) if e.kind() == IoErrorKind::NotFound => {},
            Err(e) => return Err(ErrorKind::io(e, &sidecar)),
        }
    }
    Ok(())
}

/// Move a store file and its sidecars, replacing whatever was at `to`.
pub(crate) async fn move_store(from: &Path, to: &Path) -> Result<()> {
    // Stale sidecars at the destination would be replayed into the moved store.
    for suffix in SIDECARS {
        let stale = sidecar(to, suffix);
        match fs::remove_file(&stale).await {
            Ok(()) => {},
            Err(e) if e.kind() == IoErrorKind::NotFound => {},
            Err(e) => return Err(ErrorKind::io(e, &stale)),
        }
    }
    move_file(from, to).await?;
    for suffix in SIDECARS {
        let source = sidecar(from, suffix);
        if exists(&source).await? {
            move_file(&source, &sidecar(to, suffix)).await?;
        }
    }
    Ok(())
}

async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(e, parent))?;
    }
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        // Trash on another filesystem: copy, then remove the original.
        Err(e) if e.kind() == IoErrorKind::CrossesDevices => {
            fs::copy(from, to).await.map_err(|e| ErrorKind::io(e, to))?;
            fs::remove_file(from).await.map_err(|e| ErrorKind::io(e, from))
        },
        Err(e) => Err(ErrorKind::io(e, from)),
    }
}

/// Whether both paths name the same existing file.
pub(crate) async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy a file into place, creating parent directories.
pub(crate) async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if let Some(parent) = to.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(e, parent))?;
    }
    fs::copy(from, to).await.map_err(|e| ErrorKind::io(e, from))
}

/// Check that `path` is a regular file that starts with the SQLite header.
pub(crate) async fn check_store_file(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).await.map_err(|e| ErrorKind::io(e, path))?;
    if !metadata.is_file() {
        exn::bail!(ErrorKind::NotADatabase(path.to_path_buf()));
    }
    let mut header = [0u8; 16];
    let mut file = fs::File::open(path).await.map_err(|e| ErrorKind::io(e, path))?;
    match file.read_exact(&mut header).await {
        Ok(_) if &header == SQLITE_HEADER => Ok(()),
        Ok(_) => exn::bail!(ErrorKind::NotADatabase(path.to_path_buf())),
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => exn::bail!(ErrorKind::NotADatabase(path.to_path_buf())),
        Err(e) => Err(ErrorKind::io(e, path)),
    }
}
