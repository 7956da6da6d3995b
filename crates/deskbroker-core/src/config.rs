//! broker.toml configuration parser and `DESKTOP_SERVERS` list parsing.
//!
//! ```toml
//! default_capacity = 50
//! health_port = 6000
//!
//! [[nodes]]
//! host = "desktop-1"
//! port = 177
//! capacity = 80
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::NodeRegistry;
use crate::types::Node;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid server entry {0:?}, expected host:port[:capacity]")]
    InvalidEntry(String),

    #[error("invalid port in server entry {0:?}")]
    InvalidPort(String),

    #[error("invalid capacity in server entry {0:?}")]
    InvalidCapacity(String),

    #[error("no desktop servers configured")]
    NoNodes,

    #[error("duplicate desktop server host: {0}")]
    DuplicateHost(String),

    #[error("desktop server {0} has zero capacity")]
    ZeroCapacity(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    /// Capacity for nodes that do not set their own.
    pub default_capacity: Option<u32>,
    /// Port of the `/health` endpoint on every node.
    pub health_port: Option<u16>,
    /// Explicit node list; replaces `DESKTOP_SERVERS` when present.
    pub nodes: Option<Vec<NodeEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeEntry {
    pub host: String,
    pub port: u16,
    pub capacity: Option<u32>,
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build the node registry.
    ///
    /// File-declared nodes win over `server_list`; a capacity set in the
    /// file wins over `default_capacity`.
    pub fn build_registry(
        &self,
        server_list: &str,
        default_capacity: u32,
    ) -> Result<NodeRegistry, ConfigError> {
        let capacity = self.default_capacity.unwrap_or(default_capacity);
        let nodes = match &self.nodes {
            Some(entries) => entries
                .iter()
                .map(|e| Node::new(e.host.clone(), e.port, e.capacity.unwrap_or(capacity)))
                .collect(),
            None => parse_server_list(server_list, capacity)?,
        };
        NodeRegistry::new(nodes)
    }
}

/// Parse a comma-separated `host:port[:capacity]` list.
///
/// Blank entries (e.g. a trailing comma) are skipped.
pub fn parse_server_list(list: &str, default_capacity: u32) -> Result<Vec<Node>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_server_entry(entry, default_capacity))
        .collect()
}

fn parse_server_entry(entry: &str, default_capacity: u32) -> Result<Node, ConfigError> {
    let mut parts = entry.split(':');
    let host = parts.next().unwrap_or_default().trim();
    let port = parts
        .next()
        .ok_or_else(|| ConfigError::InvalidEntry(entry.to_string()))?;
    let capacity = parts.next();
    if host.is_empty() || parts.next().is_some() {
        return Err(ConfigError::InvalidEntry(entry.to_string()));
    }

    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(entry.to_string()))?;
    let capacity = match capacity {
        Some(c) => c
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidCapacity(entry.to_string()))?,
        None => default_capacity,
    };

    Ok(Node::new(host, port, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_server_list() {
        let nodes = parse_server_list("desktop-1:177,desktop-2:177", 50).unwrap();
        assert_eq!(
            nodes,
            vec![Node::new("desktop-1", 177, 50), Node::new("desktop-2", 177, 50)]
        );
    }

    #[test]
    fn parse_per_entry_capacity_override() {
        let nodes = parse_server_list("a:177:5, b:3389", 50).unwrap();
        assert_eq!(nodes[0].capacity, 5);
        assert_eq!(nodes[1].capacity, 50);
        assert_eq!(nodes[1].port, 3389);
    }

    #[test]
    fn parse_skips_blank_entries() {
        let nodes = parse_server_list("a:177,,b:177,", 1).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(matches!(
            parse_server_list("desktop-1", 50),
            Err(ConfigError::InvalidEntry(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_port() {
        assert!(matches!(
            parse_server_list("desktop-1:xdmcp", 50),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            parse_server_list("desktop-1:70000", 50),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_capacity() {
        assert!(matches!(
            parse_server_list("desktop-1:177:lots", 50),
            Err(ConfigError::InvalidCapacity(_))
        ));
    }

    #[test]
    fn parse_rejects_extra_fields() {
        assert!(matches!(
            parse_server_list("desktop-1:177:5:9", 50),
            Err(ConfigError::InvalidEntry(_))
        ));
    }

    #[test]
    fn toml_nodes_replace_server_list() {
        let config = BrokerConfig::parse(
            r#"
default_capacity = 4

[[nodes]]
host = "gpu-1"
port = 177
capacity = 2

[[nodes]]
host = "gpu-2"
port = 177
"#,
        )
        .unwrap();

        let registry = config.build_registry("ignored:1", 50).unwrap();
        let caps: Vec<(&str, u32)> = registry
            .nodes()
            .iter()
            .map(|n| (n.host.as_str(), n.capacity))
            .collect();
        assert_eq!(caps, vec![("gpu-1", 2), ("gpu-2", 4)]);
    }

    #[test]
    fn empty_config_falls_back_to_server_list() {
        let config = BrokerConfig::parse("").unwrap();
        assert_eq!(config, BrokerConfig::default());

        let registry = config.build_registry("a:177,b:177", 7).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.nodes().iter().all(|n| n.capacity == 7));
    }

    #[test]
    fn empty_server_list_is_an_error() {
        let config = BrokerConfig::default();
        assert!(matches!(
            config.build_registry(" , ", 50),
            Err(ConfigError::NoNodes)
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.toml");
        std::fs::write(&path, "health_port = 7000\n").unwrap();

        let config = BrokerConfig::from_file(&path).unwrap();
        assert_eq!(config.health_port, Some(7000));
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let err = BrokerConfig::from_file(Path::new("/nonexistent/broker.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
