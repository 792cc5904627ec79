//! Path validation.
//!
//! Cache keys are derived from entry ids, and entry ids arrive from a remote
//! catalog. Every path handed to a backend goes through [`validate`] first so
//! a hostile id can never address anything outside the backend root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// `..` components are resolved lexically and rejected if they would climb
/// above the root. Null bytes and Windows prefixes are rejected, as is any
/// path that normalizes to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shelf_storage::validate_path;
/// assert!(validate_path("a96676e5-8ae2-425e-b549-7f15dd34a6d8.jpg").is_ok());
/// assert!(validate_path("nested/./cover.jpg").is_ok());
/// assert!(validate_path("../library.db").is_err());
/// assert!(validate_path("a\0b.jpg").is_err());
/// assert_eq!(validate_path("x/../y//cover.jpg/").unwrap(), Path::new("y/cover.jpg"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Survives Path::components() on Unix but truncates in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
