//! Storage backends.
//!
//! Two things in Shelf are "a directory of bytes": the cover cache, where
//! downloaded artwork lives keyed by entry id, and the destination a user
//! picks for a backup snapshot. Both go through [`StorageBackend`] so the
//! engine never assumes a destination is path-addressable.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
