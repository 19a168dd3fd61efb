//! Domain models and manifest parsing for the Building Component Library cache.
//!
//! Every artifact distributed through the registry — a reusable building
//! component or an energy-conservation measure — carries a manifest file
//! (`component.xml` or `measure.xml`) describing its identity, metadata,
//! payload files, and searchable attributes. This crate owns the value types
//! shared by the local store and the remote client, plus the parser that
//! turns a manifest document into those types.
//!
//! # Architecture
//! - **Records**: the persistent identity of an artifact, keyed by
//!   `(uid, version_id)`. Measures additionally carry a modeler description.
//! - **Attributes**: typed name/value/units triples used for faceted search.
//!   In memory the value is a genuine sum type; it only degrades to
//!   `(text, type-tag)` at the persistence boundary.
//! - **Manifests**: the parsed form of `component.xml`/`measure.xml`,
//!   produced from downloaded archives before installation.

pub mod error;
pub mod models;
mod parse;

pub use crate::models::attribute::{Attribute, AttributeValue};
pub use crate::models::environment::Environment;
pub use crate::models::file::FileReference;
pub use crate::models::manifest::Manifest;
pub use crate::models::record::{Record, RecordKind};
