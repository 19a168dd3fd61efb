//! The artifact-source capability and its two adapters.
//!
//! Both the local store and the remote registry can answer "give me this
//! component or measure". The orchestrator composes one of each behind
//! this trait rather than knowing either concrete type, which also lets
//! tests substitute a mock for the network-backed side.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use bcl_manifest::{Record, RecordKind};
use bcl_remote::RemoteClient;
use bcl_store::Store;
use exn::ResultExt;
use std::sync::Arc;
use tracing::debug;

/// Something that can produce component and measure records by identity.
///
/// `Ok(None)` means "not available here"; an error means the source itself
/// failed. A `version_id` of `None` asks for whatever the source considers
/// current.
#[async_trait]
pub trait ArtifactSource {
    async fn get_component(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>>;
    async fn get_measure(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>>;
}

/// Store-backed source. Never touches the network.
#[derive(Clone)]
pub struct LocalSource {
    store: Arc<Store>,
}

impl LocalSource {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[async_trait]
impl ArtifactSource for LocalSource {
    async fn get_component(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        self.store.get(RecordKind::Component, uid, version_id).await.or_raise(|| ErrorKind::Local)
    }

    async fn get_measure(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        self.store.get(RecordKind::Measure, uid, version_id).await.or_raise(|| ErrorKind::Local)
    }
}

/// Registry-backed source. Every hit goes through the client's download
/// pipeline, so a successful answer has already been written through to
/// the local store.
pub struct RemoteSource {
    client: RemoteClient,
}

impl RemoteSource {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    /// The registry serves whatever it considers current for a uid; a
    /// requested version id is not forwarded. Callers compare the returned
    /// record's version against what they wanted.
    async fn fetch(&self, kind: RecordKind, uid: &str) -> Result<Option<Record>> {
        if !self.client.start_download(uid) {
            exn::bail!(ErrorKind::Remote);
        }
        let Some(outcome) = self.client.wait_for_download().await else {
            return Ok(None);
        };
        match outcome.installed {
            Some(record) if record.kind == kind => Ok(Some(record)),
            Some(record) => {
                debug!(uid, requested = %kind, received = %record.kind, "registry served a different artifact kind");
                Ok(None)
            },
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ArtifactSource for RemoteSource {
    async fn get_component(&self, uid: &str, _version_id: Option<&str>) -> Result<Option<Record>> {
        self.fetch(RecordKind::Component, uid).await
    }

    async fn get_measure(&self, uid: &str, _version_id: Option<&str>) -> Result<Option<Record>> {
        self.fetch(RecordKind::Measure, uid).await
    }
}
