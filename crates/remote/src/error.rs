//! Remote Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A remote source error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The HTTP client could not be constructed.
    #[display("HTTP client setup failed")]
    Client,
    /// The source URI isn't an `http(s)` URL.
    #[display("invalid source URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// Connection, TLS, or body transfer failure.
    #[display("request failed: {_0}")]
    Request(#[error(not(source))] String),
    /// The server answered with a non-success status.
    #[display("unexpected HTTP status {_0}")]
    Status(#[error(not(source))] u16),
    /// The server answered successfully with zero bytes.
    #[display("empty response body")]
    EmptyBody,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::EmptyBody => true,
            // Rate limits and server errors clear up; a 404 will not.
            Self::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            Self::Client | Self::InvalidUrl(_) => false,
        }
    }
}
