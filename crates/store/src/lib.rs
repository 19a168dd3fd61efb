//! Local, versioned, persistent store for installed BCL components and
//! measures.
//!
//! The store owns a library root directory containing the `components.sql`
//! index (SQLite) and one payload directory per installed record at
//! `root/uid/version_id/`. The index is authoritative for metadata and
//! search; the payload directories hold the manifest plus files exactly as
//! downloaded.
//!
//! # Architecture
//! - **Records**: components and measures, keyed by `(uid, version_id)`,
//!   one table per kind.
//! - **Files/Attributes**: per-record metadata mirrors used for listing and
//!   attribute-based search.
//! - **Settings**: process-wide key/value rows — schema version bookkeeping
//!   and one auth key per registry environment.
//!
//! Mutations are wrapped in explicit transactions; the filesystem is only
//! touched after a successful commit. The store is single-writer and
//! process-local by design.

mod db;
mod dirs;
pub mod error;
mod models;
mod store;

pub use crate::db::Database;
pub use crate::store::{INDEX_FILENAME, Store};
