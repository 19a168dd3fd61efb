//! Client for the remote component and measure registry.
//!
//! Provides meta-search, paged search, update checks, auth-key validation,
//! and a single-flight download pipeline that installs fetched artifacts
//! into a [`bcl_store::Store`].

pub mod client;
pub mod download;
pub mod error;
mod flight;
mod xml;

pub use crate::client::{AUTH_KEY_LEN, ClientConfig, Endpoint, RemoteClient};
pub use crate::download::DownloadOutcome;
pub use crate::xml::{Facet, MetaSearchResult, SearchResult, TaxonomyTerm};
