use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_proxy::{BindingConfig, ClientCredentials, NamedEndpoints, RetryPolicy, ServerAddress};

use crate::error::ConfigError;
use crate::mapping::{MappingEntry, MappingTable};

/// What a reload does with entries that fail to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Report and skip bad entries, bind the rest
    Lenient,
    /// Abort the reload and keep the previous table
    Strict,
}

impl Default for LoadMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LoadMode::Lenient
        } else {
            LoadMode::Strict
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Ignore `max_retries` and retry for as long as faults are repaired
    pub unbounded: bool,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            unbounded: false,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: (!self.unbounded).then_some(self.max_retries),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Client-side configuration: default server, bindings, credentials and
/// the mapping table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: Option<ServerAddress>,
    pub binding: BindingConfig,
    pub endpoints: NamedEndpoints,
    pub credentials: ClientCredentials,
    pub retry: RetryConfig,
    pub load_mode: LoadMode,
    #[serde(rename = "mapping")]
    pub mappings: Vec<MappingEntry>,
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, "<inline>")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })
    }

    pub fn with_server(mut self, name: impl Into<String>, port: u16) -> Self {
        self.server = Some(ServerAddress::new(name, port));
        self
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_mapping(mut self, entry: MappingEntry) -> Self {
        self.mappings.push(entry);
        self
    }

    pub fn mapping_table(&self) -> MappingTable {
        MappingTable::new(self.mappings.iter().cloned())
    }
}

/// Where the locator reads its configuration from on every reload
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<ClientConfig, ConfigError>;

    /// Short label for log output
    fn describe(&self) -> String;
}

/// In-memory configuration, useful for tests and embedded setups
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub ClientConfig);

impl ConfigSource for StaticConfig {
    fn load(&self) -> Result<ClientConfig, ConfigError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// TOML file, re-read on every reload
#[derive(Debug, Clone)]
pub struct TomlFileSource {
    path: PathBuf,
}

impl TomlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for TomlFileSource {
    fn load(&self) -> Result<ClientConfig, ConfigError> {
        ClientConfig::from_file(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
