//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The local store failed.
    #[display("local store error")]
    Local,
    /// The remote source failed or refused the request.
    #[display("remote source error")]
    Remote,
    /// A write-through completed but the re-read record did not match what
    /// the remote reported. The store may hold a different artifact under
    /// the same identity.
    #[display("write-through re-read disagrees with the remote record")]
    Mismatch,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote)
    }
}
