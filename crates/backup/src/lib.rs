//! Backups and destructive store maintenance.
//!
//! - [`Exporter`] writes a consistent, privacy-scrubbed snapshot of the live
//!   store to a destination of the user's choosing.
//! - [`Guard`] resets the store (into a single-slot trash), imports a snapshot
//!   over it, or restores the trashed store, always behind a confirmation.
//!
//! Everything here treats a failed step as fatal to the whole operation and
//! surfaces exactly one error.

pub mod error;
mod export;
mod files;
mod guard;

pub use crate::export::{DEFAULT_SNAPSHOT_NAME, Exported, Exporter};
pub use crate::guard::{Assume, Confirm, Guard, ImportSource, Operation, Outcome, Prompt, State};
