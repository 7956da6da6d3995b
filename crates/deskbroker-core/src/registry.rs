//! The static node registry.
//!
//! Holds the ordered list of candidate desktop servers. Order matters:
//! the scheduler breaks load-ratio ties by registry position.

use std::collections::HashSet;

use crate::config::ConfigError;
use crate::types::Node;

/// Fixed, ordered set of desktop servers loaded at startup.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    /// Validate and freeze a node list.
    ///
    /// Rejects an empty list, duplicate hosts, and zero capacities.
    pub fn new(nodes: Vec<Node>) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            if node.host.is_empty() {
                return Err(ConfigError::InvalidEntry(format!(":{}", node.port)));
            }
            if node.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(node.host.clone()));
            }
            if !seen.insert(node.host.as_str()) {
                return Err(ConfigError::DuplicateHost(node.host.clone()));
            }
        }

        Ok(Self { nodes })
    }

    /// All nodes, in registry order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Look up a node by host.
    pub fn get(&self, host: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.host == host)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
