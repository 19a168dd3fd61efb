//! Layered configuration for the component library.
//!
//! Values are resolved in precedence order: built-in defaults, then an
//! optional TOML file, then `BCL_`-prefixed environment variables (nested
//! keys separated by `__`, e.g. `BCL_REMOTE__PAGE_SIZE`). Loading always
//! ends with [`Config::validated`], so out-of-range tunables are clamped
//! before anything downstream sees them.

pub mod error;

use crate::error::{ErrorKind, Result};
use bcl_manifest::Environment;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ENV_PREFIX: &str = "BCL_";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const TIMEOUT_FLOOR_SECS: u64 = 10;

/// Where the local library lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directory holding the artifact tree and the index database.
    pub root: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let root = directories::ProjectDirs::from("gov", "nrel", "bcl")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("bcl"));
        Self { root }
    }
}

/// One registry environment's HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub api_version: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { url: "https://bcl.nrel.gov".to_string(), api_version: "2.0".to_string() }
    }
}

/// Registry client tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Which environment is active at startup.
    pub environment: Environment,
    /// Search page size, clamped to `[1, 100]` during validation.
    pub page_size: u32,
    /// Per-request timeout in seconds, floored at 10 during validation.
    pub timeout_secs: u64,
    pub production: EndpointConfig,
    pub development: EndpointConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            production: EndpointConfig::default(),
            development: EndpointConfig {
                url: "https://bcl7.development.nrel.gov".to_string(),
                ..EndpointConfig::default()
            },
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub remote: RemoteConfig,
}

impl Config {
    /// Load from defaults, the platform config file if one exists, and
    /// the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_file_path().as_deref())
    }

    /// Load with an explicit config file path. `None` skips the file
    /// layer entirely.
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            debug!(path = %file.display(), "merging configuration file");
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR));
        Self::extract(figment)
    }

    /// Per-platform default config file location, if one can be derived.
    pub fn default_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("gov", "nrel", "bcl")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(ErrorKind::Figment)?;
        config.validated()
    }

    /// Enforce the invariants downstream code relies on: a usable library
    /// root and endpoint URLs, the page-size clamp, the timeout floor.
    pub fn validated(mut self) -> Result<Self> {
        if self.library.root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Validation("library root must not be empty"));
        }
        for endpoint in [&self.remote.production, &self.remote.development] {
            if endpoint.url.is_empty() {
                exn::bail!(ErrorKind::Validation("endpoint url must not be empty"));
            }
            if endpoint.api_version.is_empty() {
                exn::bail!(ErrorKind::Validation("endpoint api version must not be empty"));
            }
        }
        let page_size = self.remote.page_size.clamp(1, MAX_PAGE_SIZE);
        if page_size != self.remote.page_size {
            warn!(requested = self.remote.page_size, effective = page_size, "page size out of range, clamped");
            self.remote.page_size = page_size;
        }
        if self.remote.timeout_secs < TIMEOUT_FLOOR_SECS {
            warn!(
                requested = self.remote.timeout_secs,
                floor = TIMEOUT_FLOOR_SECS,
                "timeout below the safety floor, raised",
            );
            self.remote.timeout_secs = TIMEOUT_FLOOR_SECS;
        }
        Ok(self)
    }
}
