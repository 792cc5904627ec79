//! Image source trait and implementations.

mod http;
#[cfg(feature = "mock")]
mod mock;

pub use self::http::{DEFAULT_USER_AGENT, HttpSource};
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
use crate::error::Result;
use async_trait::async_trait;

/// Somewhere cover artwork can be fetched from by URL.
///
/// A fetch is a single idempotent attempt. Retry policy belongs to the
/// caller, which knows whether a failure should be surfaced or deferred.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the complete body at `url`.
    ///
    /// A successful response with an empty body is an error
    /// ([`EmptyBody`](crate::error::ErrorKind::EmptyBody)): an empty cache file
    /// would look cached while rendering as nothing.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
