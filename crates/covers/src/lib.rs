//! Cover artwork cache.
//!
//! Every library entry may carry a remote artwork URL (its *source*) and a
//! *pointer* to where that artwork is cached on this device. The pointer is
//! never trusted blindly: the cache directory can be cleared by the OS or the
//! user at any time, and a freshly imported store arrives with its pointers
//! blanked. A reconciliation pass finds every entry whose pointer can't be
//! trusted, downloads its artwork into the cache directory as `<id>.jpg`, and
//! records the new pointer.
//!
//! Passes are cheap to trigger and safe to trigger often. An entry whose
//! download fails stays stale and is picked up again by the next pass.

mod cache;
pub mod error;
mod report;

pub use crate::cache::{CoverCache, CoverOptions, DEFAULT_CONCURRENCY, DEFAULT_RETRY_DELAY, cache_key};
pub use crate::report::{Failure, Notice, Pass, Reconciliation};
