//! Read-through cache for building-energy components and measures.
//!
//! Composes the local versioned store ([`bcl_store`]) and the registry
//! client ([`bcl_remote`]) behind one lookup surface: exact cached versions
//! are served locally, everything else is fetched, written through, and
//! verified.

pub mod error;
mod library;
mod source;

pub use crate::library::Library;
pub use crate::source::{ArtifactSource, LocalSource, RemoteSource};
