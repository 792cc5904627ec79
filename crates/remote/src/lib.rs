//! Remote image source.
//!
//! Cover artwork is fetched with a plain, unauthenticated, idempotent HTTP
//! GET. Everything that can go wrong here is transient from the caller's
//! point of view: the reconciliation engine retries once and otherwise waits
//! for the next pass.

pub mod error;
pub mod source;

pub use crate::source::{DEFAULT_USER_AGENT, HttpSource, ImageSource};
pub use reqwest::Url;
use std::sync::Arc;

pub type SourceHandle = Arc<dyn ImageSource + Send + Sync>;

/// Whether a stored value is a remote URL rather than a local path.
///
/// Entries saved straight from catalog search carry the online link in the
/// cover pointer until a download replaces it.
///
/// ```
/// use shelf_remote::looks_remote;
/// assert!(looks_remote("https://uploads.example.org/covers/a/b.jpg"));
/// assert!(!looks_remote("/home/me/.local/share/shelf/covers/a.jpg"));
/// assert!(!looks_remote("file:///home/me/covers/a.jpg"));
/// ```
pub fn looks_remote(pointer: &str) -> bool {
    Url::parse(pointer).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
