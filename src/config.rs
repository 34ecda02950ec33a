//! Adapter configuration.
//!
//! Every section has a `Default` matching the layout of the benchmark
//! container, so a JSON file only needs to name what differs.

use crate::error::{AdapterError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// When a loaded version makes the adapter ready for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Ready for queries right after every successful load.
    #[default]
    Immediate,
    /// Ready only after the cycle announced as the last loading phase.
    AfterLastPhase,
}

/// Which binding implements the version loader port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Invoke the store-specific ingester program.
    #[default]
    Ingester,
    /// Copy the fragment files into the store directory.
    FileDrop,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub kind: LoaderKind,
    /// Program and leading arguments; the store directory, version id and
    /// source directory are appended.
    pub command: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { kind: LoaderKind::Ingester, command: vec!["version-ingester".to_string()] }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Program and leading arguments; the source descriptor is appended.
    pub command: Vec<String>,
    /// Environment variable through which the engine config file is passed.
    pub config_env_var: String,
    pub config_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Connection attempts before giving up on the endpoint.
    pub max_attempts: u32,
    pub backoff_millis: u64,
    /// Per-request timeout when talking to the running endpoint.
    pub request_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            command: vec!["sparql-endpoint".to_string()],
            config_env_var: "QUERY_ENDPOINT_CONFIG".to_string(),
            config_file: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            path: "/sparql".to_string(),
            max_attempts: 100,
            backoff_millis: 200,
            request_timeout_secs: 300,
        }
    }
}

impl EndpointConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The MQTT connection used as the message bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Topics are `<prefix>/data`, `<prefix>/command`, `<prefix>/task`,
    /// `<prefix>/controller` and `<prefix>/results`.
    pub topic_prefix: String,
}

impl Default for MqttBusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "versioned_adapter".to_string(),
            keep_alive_secs: 30,
            topic_prefix: "benchmark".to_string(),
        }
    }
}

/// Top-level adapter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Flat directory holding the fragments of the current cycle.
    pub staging_dir: PathBuf,
    /// Persistent directory of the versioned store.
    pub store_dir: PathBuf,
    pub cycle_policy: CyclePolicy,
    /// Byte offset of the query-kind marker inside the query text.
    pub query_kind_offset: usize,
    /// Start the query endpoint while answering a storage-space task.
    pub warm_endpoint_on_storage_task: bool,
    pub loader: LoaderConfig,
    pub endpoint: EndpointConfig,
    pub bus: MqttBusConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./data/staging"),
            store_dir: PathBuf::from("./data/store"),
            cycle_policy: CyclePolicy::default(),
            query_kind_offset: 21,
            warm_endpoint_on_storage_task: true,
            loader: LoaderConfig::default(),
            endpoint: EndpointConfig::default(),
            bus: MqttBusConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Read a JSON configuration file; absent keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| AdapterError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.loader.kind == LoaderKind::Ingester && self.loader.command.is_empty() {
            return Err(AdapterError::Config("loader.command must name a program".to_string()));
        }
        if self.endpoint.command.is_empty() {
            return Err(AdapterError::Config("endpoint.command must name a program".to_string()));
        }
        if self.endpoint.max_attempts == 0 {
            return Err(AdapterError::Config("endpoint.max_attempts must be positive".to_string()));
        }
        Ok(())
    }
}
