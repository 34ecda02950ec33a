//! Startup payload exchanged between the adapter and the query endpoint.

use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const VERSIONED_STORE_SOURCE: &str = "versionedStore";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// `{"sources":[{"type":"versionedStore","value":"<store dir>"}]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub sources: Vec<Source>,
}

impl SourceDescriptor {
    pub fn for_store(store_dir: &Path) -> Self {
        Self {
            sources: vec![Source {
                kind: VERSIONED_STORE_SOURCE.to_string(),
                value: store_dir.display().to_string(),
            }],
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AdapterError::Config(format!("invalid source descriptor: {}", e)))
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "sources": self.sources }).to_string()
    }

    /// Directory of the first versioned store source.
    pub fn store_dir(&self) -> Result<PathBuf> {
        self.sources
            .iter()
            .find(|source| source.kind == VERSIONED_STORE_SOURCE)
            .map(|source| PathBuf::from(&source.value))
            .ok_or_else(|| AdapterError::Config("no versionedStore source given".to_string()))
    }
}

/// Engine configuration file named by the endpoint's config variable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointFileConfig {
    pub port: u16,
    pub path: String,
}

impl Default for EndpointFileConfig {
    fn default() -> Self {
        Self { port: 3000, path: "/sparql".to_string() }
    }
}

impl EndpointFileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| AdapterError::Config(format!("invalid endpoint config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_names_store() {
        let json = SourceDescriptor::for_store(Path::new("/data/store")).to_json();
        assert_eq!(json, r#"{"sources":[{"type":"versionedStore","value":"/data/store"}]}"#);
        let parsed = SourceDescriptor::parse(&json).unwrap();
        assert_eq!(parsed.store_dir().unwrap(), PathBuf::from("/data/store"));
    }

    #[test]
    fn test_descriptor_without_store_source() {
        let parsed = SourceDescriptor::parse(r#"{"sources":[{"type":"file","value":"x"}]}"#).unwrap();
        assert!(matches!(parsed.store_dir(), Err(AdapterError::Config(_))));
        assert!(SourceDescriptor::parse("[]").is_err());
    }

    #[test]
    fn test_endpoint_file_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("endpoint.json");
        std::fs::write(&path, r#"{"port": 3456}"#).unwrap();
        let config = EndpointFileConfig::from_file(&path).unwrap();
        assert_eq!(config, EndpointFileConfig { port: 3456, path: "/sparql".to_string() });
    }
}
