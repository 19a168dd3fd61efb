//! Manifest Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A manifest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Document is not well-formed XML or doesn't match the manifest schema.
    #[display("malformed manifest document")]
    Xml,
    /// A required manifest field is missing or empty.
    #[display("manifest is missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A field is present but its value can't be interpreted.
    #[display("invalid manifest data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
