//! Remote Client Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A remote-client error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Transport-level failure: unreachable host, timeout, broken stream.
    #[display("network error")]
    Network,
    /// The server responded, but not with the XML we expected.
    #[display("malformed registry response")]
    Protocol,
    /// A downloaded artifact failed a pre-install check.
    #[display("downloaded artifact rejected: {_0}")]
    Validation(#[error(not(source))] &'static str),
    /// Zip archive could not be read or extracted.
    #[display("archive error")]
    Archive,
    /// The local store rejected the install.
    #[display("local store error")]
    Store,
    /// Temp-file plumbing failure.
    #[display("I/O error")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Io(_))
    }
}
