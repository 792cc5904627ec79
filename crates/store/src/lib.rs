//! SQLite relational store for library state.
//!
//! The store is the source of truth for everything the user tracks. It holds
//! library entries (metadata, progress, and the pointer to each entry's cached
//! artwork), the local profile, and the `app_meta` key/value table where the
//! cover sync flag lives.
//!
//! # Concurrency
//! All access goes through one pooled connection. Short repository calls
//! queue behind each other; [`Database::acquire`] takes the connection for
//! exclusive multi-statement work such as checkpoint, attach and detach.

mod attach;
mod db;
pub mod error;
mod flag;
mod models;
mod repo;
pub mod snapshot;

pub use crate::attach::Attachment;
pub use crate::db::Database;
pub use crate::flag::{Schema, SyncFlag, SyncState, write_flag};
pub use crate::models::{LibraryEntry, Profile, Status};
pub use crate::repo::Repository;
