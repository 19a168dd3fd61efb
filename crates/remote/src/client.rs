//! Registry client: searches, update checks, auth keys, downloads.
//!
//! One instance serves one logical consumer. Network operations are
//! strictly sequential per instance, enforced by the [`Flight`] guard: an
//! overlapping call fails fast instead of queueing. Transport and protocol
//! failures on the search surface are logged and reported as empty or
//! `None`, never as panics.

use crate::download::{self, DownloadOutcome, Listener};
use crate::error::{ErrorKind, Result};
use crate::flight::Flight;
use crate::xml::{self, MetaSearchResult, SearchResult};
use async_trait::async_trait;
use bcl_manifest::{Environment, Record, RecordKind};
use bcl_store::Store;
use exn::ResultExt;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Expected length of a registry auth key.
pub const AUTH_KEY_LEN: usize = 32;
/// Requests shorter than this are raised to it with a warning.
const TIMEOUT_FLOOR: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Characters escaped in the query path segment. The wildcard `*` is
/// deliberately left bare, it is how an empty query is spelled.
const QUERY_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// One registry environment's HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub api_version: String,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self { url: url.into(), api_version: api_version.into() }
    }
}

/// Client tunables. [`ClientConfig::sanitized`] applies the page-size
/// clamp and the timeout floor; construction goes through it so an
/// out-of-range value can never reach the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub production: Endpoint,
    pub development: Endpoint,
    pub page_size: u32,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            production: Endpoint::new("https://bcl.nrel.gov", "2.0"),
            development: Endpoint::new("https://bcl7.development.nrel.gov", "2.0"),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Clamp the page size to `[1, 100]` and raise the timeout to the
    /// floor, warning when either value had to change.
    pub fn sanitized(mut self) -> Self {
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        if page_size != self.page_size {
            warn!(requested = self.page_size, effective = page_size, "page size out of range, clamped");
            self.page_size = page_size;
        }
        if self.timeout < TIMEOUT_FLOOR {
            warn!(
                requested_secs = self.timeout.as_secs(),
                floor_secs = TIMEOUT_FLOOR.as_secs(),
                "request timeout below the safety floor, raised",
            );
            self.timeout = TIMEOUT_FLOOR;
        }
        self
    }

    fn endpoint(&self, env: Environment) -> &Endpoint {
        match env {
            Environment::Production => &self.production,
            Environment::Development => &self.development,
        }
    }
}

/// Issues one GET and returns the response body.
///
/// The search surface goes through this seam so tests can observe exactly
/// which requests would hit the wire without any live network. Downloads
/// stream through the `reqwest` client directly.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    async fn get_text(&self, url: &str, pairs: &[(String, String)]) -> Result<String>;
}

struct HttpTransport {
    http: reqwest::Client,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str, pairs: &[(String, String)]) -> Result<String> {
        let response = self
            .http
            .get(url)
            .query(pairs)
            .send()
            .await
            .or_raise(|| ErrorKind::Network)?
            .error_for_status()
            .or_raise(|| ErrorKind::Network)?;
        response.text().await.or_raise(|| ErrorKind::Network)
    }
}

/// Client for the component and measure registry.
pub struct RemoteClient {
    http: reqwest::Client,
    transport: Box<dyn Transport>,
    config: ClientConfig,
    environment: Environment,
    auth_keys: HashMap<Environment, String>,
    validated_keys: Mutex<HashMap<(String, Environment), bool>>,
    flight: Flight,
    job: Mutex<Option<JoinHandle<DownloadOutcome>>>,
    listener: Option<Listener>,
    last_meta_search: Mutex<Option<MetaSearchResult>>,
    last_search: Mutex<Option<Vec<SearchResult>>>,
    store: Arc<Store>,
}

impl RemoteClient {
    /// Build a client over `store`, loading both environments' persisted
    /// auth keys. The store also receives downloaded artifacts.
    pub async fn new(store: Arc<Store>, config: ClientConfig) -> Result<Self> {
        let config = config.sanitized();
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .or_raise(|| ErrorKind::Network)?;
        let mut auth_keys = HashMap::new();
        for env in [Environment::Production, Environment::Development] {
            let key = store.auth_key(env).await.or_raise(|| ErrorKind::Store)?;
            auth_keys.insert(env, key);
        }
        Ok(Self {
            http: http.clone(),
            transport: Box::new(HttpTransport { http }),
            config,
            environment: Environment::default(),
            auth_keys,
            validated_keys: Mutex::new(HashMap::new()),
            flight: Flight::default(),
            job: Mutex::new(None),
            listener: None,
            last_meta_search: Mutex::new(None),
            last_search: Mutex::new(None),
            store,
        })
    }

    /// Switch the active environment. Base URL and effective auth key swap
    /// together; keys for both environments stay loaded at all times.
    pub fn set_environment(&mut self, env: Environment) {
        self.environment = env;
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// The auth key in effect for the active environment. Empty when unset.
    pub fn auth_key(&self) -> &str {
        self.auth_keys.get(&self.environment).map(String::as_str).unwrap_or_default()
    }

    /// Register a callback invoked when a download task completes, on
    /// success and failure alike.
    pub fn set_download_listener(&mut self, listener: impl Fn(&DownloadOutcome) + Send + Sync + 'static) {
        self.listener = Some(Arc::new(listener));
    }

    /// Validate `key` against `env` and, if accepted, persist it and make
    /// it effective. A rejected key changes nothing.
    pub async fn set_auth_key(&mut self, env: Environment, key: &str) -> Result<bool> {
        if !self.validate_auth_key(key, env).await {
            return Ok(false);
        }
        self.store.set_auth_key(env, key).await.or_raise(|| ErrorKind::Store)?;
        self.auth_keys.insert(env, key.to_string());
        Ok(true)
    }

    /// Check a key by issuing a zero-row search against `env`. The key is
    /// accepted only when the response parses as XML; the verdict is
    /// cached per `(key, env)`.
    pub async fn validate_auth_key(&self, key: &str, env: Environment) -> bool {
        if key.len() != AUTH_KEY_LEN {
            return false;
        }
        let cache_key = (key.to_string(), env);
        if let Some(verdict) = lock(&self.validated_keys).get(&cache_key) {
            return *verdict;
        }
        let Some(_permit) = self.flight.try_begin() else {
            warn!("auth key validation refused, client is busy");
            return false;
        };
        let endpoint = self.config.endpoint(env);
        let url = search_url(&endpoint.url, "");
        let pairs = vec![
            ("api_version".to_string(), endpoint.api_version.clone()),
            ("show_rows".to_string(), "0".to_string()),
            ("oauth_consumer_key".to_string(), key.to_string()),
        ];
        let verdict = match self.fetch(&url, &pairs).await {
            Ok(body) => xml::is_well_formed(&body),
            Err(err) => {
                warn!(%env, error = %err, "auth key validation request failed");
                return false;
            },
        };
        lock(&self.validated_keys).insert(cache_key, verdict);
        verdict
    }

    /// Learn the total result count and facet breakdown for a query
    /// without fetching any result pages.
    pub async fn meta_search(
        &self,
        query: &str,
        filter: Option<&str>,
        kind: RecordKind,
    ) -> Option<MetaSearchResult> {
        let Some(_permit) = self.flight.try_begin() else {
            warn!("meta-search refused, client is busy");
            return None;
        };
        let endpoint = self.config.endpoint(self.environment);
        let url = meta_search_url(&endpoint.url, query);
        let pairs = search_pairs(endpoint, kind, filter, None);
        match self.fetch(&url, &pairs).await.and_then(|body| xml::meta_search(&body)) {
            Ok(meta) => {
                *lock(&self.last_meta_search) = Some(meta.clone());
                Some(meta)
            },
            Err(err) => {
                warn!(query, error = %err, "meta-search failed");
                *lock(&self.last_meta_search) = None;
                None
            },
        }
    }

    /// Fetch one page of search results. Pages are zero-based.
    pub async fn search(
        &self,
        query: &str,
        filter: Option<&str>,
        kind: RecordKind,
        page: u32,
    ) -> Vec<SearchResult> {
        let Some(_permit) = self.flight.try_begin() else {
            warn!("search refused, client is busy");
            return Vec::new();
        };
        let endpoint = self.config.endpoint(self.environment);
        let url = search_url(&endpoint.url, query);
        let pairs = search_pairs(endpoint, kind, filter, Some((self.config.page_size, page)));
        match self.fetch(&url, &pairs).await.and_then(|body| xml::search_results(&body)) {
            Ok(results) => {
                *lock(&self.last_search) = Some(results.clone());
                results
            },
            Err(err) => {
                warn!(query, page, error = %err, "search failed");
                *lock(&self.last_search) = None;
                Vec::new()
            },
        }
    }

    /// Meta-search first, then page through every result. Short-circuits
    /// to empty, without issuing any paged request, when the meta-search
    /// reports zero results.
    pub async fn search_full(&self, query: &str, filter: Option<&str>, kind: RecordKind) -> Vec<SearchResult> {
        let Some(meta) = self.meta_search(query, filter, kind).await else {
            return Vec::new();
        };
        if meta.result_count == 0 {
            debug!(query, "meta-search reported zero results, skipping paged search");
            return Vec::new();
        }
        let pages = page_count(meta.result_count, self.config.page_size);
        let mut results = Vec::new();
        for page in 0..pages {
            let mut batch = self.search(query, filter, kind, page).await;
            if batch.is_empty() {
                break;
            }
            results.append(&mut batch);
        }
        results
    }

    /// Compare each local record against the registry, one uid-scoped
    /// search at a time, and return the records whose remote version
    /// differs. Requests are strictly sequential.
    pub async fn check_for_updates(&self, local: &[Record]) -> Vec<Record> {
        let mut stale = Vec::new();
        for record in local {
            let filter = format!("ss_uuid:{}", record.uid);
            let hits = self.search("", Some(&filter), record.kind, 0).await;
            let Some(hit) = hits.iter().find(|hit| hit.uid == record.uid) else {
                debug!(uid = record.uid, "no registry entry, skipping update check");
                continue;
            };
            if hit.version_id != record.version_id {
                stale.push(record.clone());
            }
        }
        stale
    }

    /// Begin downloading `uid` in the background. Returns `false`, without
    /// issuing any request, while an earlier request is still outstanding.
    pub fn start_download(&self, uid: &str) -> bool {
        let Some(permit) = self.flight.try_begin() else {
            debug!(uid, "download refused, client is busy");
            return false;
        };
        let endpoint = self.config.endpoint(self.environment);
        let url = format!("{}/api/component/download", endpoint.url);
        let handle = tokio::spawn(download::run(
            self.http.clone(),
            url,
            uid.to_string(),
            Arc::clone(&self.store),
            self.listener.clone(),
            permit,
        ));
        *lock(&self.job) = Some(handle);
        true
    }

    /// Join the outstanding download task, if any. This is the only point
    /// at which the caller suspends on a transfer.
    pub async fn wait_for_download(&self) -> Option<DownloadOutcome> {
        let handle = lock(&self.job).take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(error = %err, "download task did not complete");
                None
            },
        }
    }

    /// Whether a request is outstanding on this instance.
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Results of the most recent successful paged search.
    pub fn last_search(&self) -> Option<Vec<SearchResult>> {
        lock(&self.last_search).clone()
    }

    /// Result of the most recent successful meta-search.
    pub fn last_meta_search(&self) -> Option<MetaSearchResult> {
        lock(&self.last_meta_search).clone()
    }

    async fn fetch(&self, url: &str, pairs: &[(String, String)]) -> Result<String> {
        self.transport.get_text(url, pairs).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An empty query is spelled `*` on the wire.
fn encode_query(query: &str) -> String {
    if query.is_empty() {
        "*".to_string()
    } else {
        utf8_percent_encode(query, QUERY_SEGMENT).to_string()
    }
}

fn meta_search_url(base: &str, query: &str) -> String {
    format!("{base}/api/metasearch/{}.xml", encode_query(query))
}

fn search_url(base: &str, query: &str) -> String {
    format!("{base}/api/search/{}.xml", encode_query(query))
}

fn search_pairs(
    endpoint: &Endpoint,
    kind: RecordKind,
    filter: Option<&str>,
    paging: Option<(u32, u32)>,
) -> Vec<(String, String)> {
    let mut pairs = vec![("fq[]".to_string(), format!("bundle:{}", kind.bundle()))];
    if let Some(filter) = filter {
        pairs.push(("fq[]".to_string(), filter.to_string()));
    }
    if let Some((page_size, page)) = paging {
        pairs.push(("show_rows".to_string(), page_size.to_string()));
        pairs.push(("page".to_string(), page.to_string()));
    }
    pairs.push(("api_version".to_string(), endpoint.api_version.clone()));
    pairs
}

fn page_count(result_count: u64, page_size: u32) -> u32 {
    result_count.div_ceil(u64::from(page_size)).min(u64::from(u32::MAX)) as u32
}
