//! Read-through orchestration over the local store and the registry.

use crate::error::{ErrorKind, Result};
use crate::source::{ArtifactSource, LocalSource, RemoteSource};
use bcl_config::Config;
use bcl_manifest::{Record, RecordKind};
use bcl_remote::{ClientConfig, Endpoint, RemoteClient};
use bcl_store::Store;
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Read-through cache over a local store and a remote source.
///
/// Generic over the remote side so tests can substitute a mock; production
/// code uses [`Library<RemoteSource>`] via [`Library::open`].
pub struct Library<R: ArtifactSource> {
    local: LocalSource,
    remote: R,
}

impl Library<RemoteSource> {
    /// Open the store at the configured root and wire a registry client
    /// over it.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.library.root).await.or_raise(|| ErrorKind::Local)?);
        let mut client = RemoteClient::new(Arc::clone(&store), client_config(config))
            .await
            .or_raise(|| ErrorKind::Remote)?;
        client.set_environment(config.remote.environment);
        Ok(Self::new(store, RemoteSource::new(client)))
    }
}

impl<R: ArtifactSource> Library<R> {
    pub fn new(store: Arc<Store>, remote: R) -> Self {
        Self { local: LocalSource::new(store), remote }
    }

    /// The underlying store, for operations the read-through surface does
    /// not cover (searches, removal, auth keys).
    pub fn store(&self) -> &Store {
        self.local.store()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    #[instrument(skip(self))]
    pub async fn get_component(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        self.get(RecordKind::Component, uid, version_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_measure(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        self.get(RecordKind::Measure, uid, version_id).await
    }

    /// An exact local version hit short-circuits without any network
    /// traffic. Everything else defers to the remote, which is
    /// authoritative for "current": even when some other version is cached
    /// locally, the registry decides what the uid resolves to. A remote
    /// answer has been written through by the download pipeline, so the
    /// record handed back is re-read from the store and checked against
    /// what the remote reported.
    async fn get(&self, kind: RecordKind, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
        let wanted = version_id.filter(|version| !version.is_empty());
        if let Some(version) = wanted {
            let cached = match kind {
                RecordKind::Component => self.local.get_component(uid, Some(version)).await?,
                RecordKind::Measure => self.local.get_measure(uid, Some(version)).await?,
            };
            if let Some(record) = cached {
                debug!(uid, version, "exact version cached locally");
                return Ok(Some(record));
            }
        }

        let reported = match kind {
            RecordKind::Component => self.remote.get_component(uid, wanted).await?,
            RecordKind::Measure => self.remote.get_measure(uid, wanted).await?,
        };
        let Some(reported) = reported else {
            return Ok(None);
        };

        let reread = match kind {
            RecordKind::Component => self.local.get_component(&reported.uid, Some(&reported.version_id)).await?,
            RecordKind::Measure => self.local.get_measure(&reported.uid, Some(&reported.version_id)).await?,
        };
        match reread {
            Some(record) if record.uid == reported.uid && record.version_id == reported.version_id => {
                Ok(Some(record))
            },
            _ => exn::bail!(ErrorKind::Mismatch),
        }
    }
}

fn client_config(config: &Config) -> ClientConfig {
    ClientConfig {
        production: Endpoint::new(&config.remote.production.url, &config.remote.production.api_version),
        development: Endpoint::new(&config.remote.development.url, &config.remote.development.api_version),
        page_size: config.remote.page_size,
        timeout: Duration::from_secs(config.remote.timeout_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bcl_manifest::{Manifest, Record};
    use std::ops::Deref;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manifest(uid: &str, version_id: &str) -> Manifest {
        Manifest {
            kind: RecordKind::Component,
            uid: uid.to_string(),
            version_id: version_id.to_string(),
            name: format!("Component {uid}"),
            description: "test artifact".to_string(),
            modeler_description: None,
            version_modified: None,
            files: Vec::new(),
            attributes: Vec::new(),
        }
    }

    async fn seed(store: &Store, uid: &str, version_id: &str) -> Record {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("component.xml"), "<component/>").unwrap();
        store.add(&manifest(uid, version_id), source.path()).await.unwrap()
    }

    /// Remote stand-in that installs a fixed manifest into the store when
    /// asked, counting how often it is consulted.
    struct FakeRemote {
        store: Arc<Store>,
        serves: Option<Manifest>,
        /// Overrides the version id reported back, to simulate a registry
        /// whose answer disagrees with what it delivered.
        reports_version: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new(store: Arc<Store>, serves: Option<Manifest>) -> Self {
            Self { store, serves, reports_version: None, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactSource for FakeRemote {
        async fn get_component(&self, _uid: &str, _version_id: Option<&str>) -> Result<Option<Record>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let Some(manifest) = &self.serves else {
                return Ok(None);
            };
            let source = tempfile::tempdir().unwrap();
            std::fs::write(source.path().join("component.xml"), "<component/>").unwrap();
            let mut record = self.store.add(manifest, source.path()).await.unwrap();
            if let Some(version) = &self.reports_version {
                record.version_id = version.clone();
            }
            Ok(Some(record))
        }

        async fn get_measure(&self, uid: &str, version_id: Option<&str>) -> Result<Option<Record>> {
            self.get_component(uid, version_id).await
        }
    }

    async fn open_store() -> (tempfile::TempDir, Arc<Store>) {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(temp.path()).await.unwrap());
        (temp, store)
    }

    #[tokio::test]
    async fn test_exact_local_hit_skips_remote() {
        let (_temp, store) = open_store().await;
        seed(&store, "comp-a", "v1").await;
        let library = Library::new(Arc::clone(&store), FakeRemote::new(Arc::clone(&store), None));

        let record = library.get_component("comp-a", Some("v1")).await.unwrap().unwrap();
        assert_eq!(record.version_id, "v1");
        assert_eq!(library.remote().calls(), 0);
    }

    #[tokio::test]
    async fn test_unversioned_request_defers_to_remote_even_when_cached() {
        let (_temp, store) = open_store().await;
        seed(&store, "comp-a", "v1").await;
        let library = Library::new(
            Arc::clone(&store),
            FakeRemote::new(Arc::clone(&store), Some(manifest("comp-a", "v2"))),
        );

        let record = library.get_component("comp-a", None).await.unwrap().unwrap();
        assert_eq!(record.version_id, "v2");
        assert_eq!(library.remote().calls(), 1);
    }

    #[tokio::test]
    async fn test_version_miss_writes_through_and_rereads() {
        let (_temp, store) = open_store().await;
        let library = Library::new(
            Arc::clone(&store),
            FakeRemote::new(Arc::clone(&store), Some(manifest("comp-b", "v7"))),
        );

        let record = library.get_component("comp-b", Some("v7")).await.unwrap().unwrap();
        assert_eq!(record.uid, "comp-b");
        assert_eq!(record.version_id, "v7");
        // Installed locally as a side effect.
        let cached = store.get(RecordKind::Component, "comp-b", Some("v7")).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_remote_miss_is_none() {
        let (_temp, store) = open_store().await;
        let library = Library::new(Arc::clone(&store), FakeRemote::new(Arc::clone(&store), None));
        assert!(library.get_component("ghost", None).await.unwrap().is_none());
        assert_eq!(library.remote().calls(), 1);
    }

    #[tokio::test]
    async fn test_reread_disagreement_is_a_mismatch() {
        let (_temp, store) = open_store().await;
        let mut remote = FakeRemote::new(Arc::clone(&store), Some(manifest("comp-c", "v1")));
        remote.reports_version = Some("v999".to_string());
        let library = Library::new(Arc::clone(&store), remote);

        let err = library.get_component("comp-c", None).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Mismatch));
    }
}
