//! Shared types used across deskbroker crates.

use serde::{Deserialize, Serialize};

/// Default number of concurrent sessions a desktop server accepts.
pub const DEFAULT_CAPACITY: u32 = 50;

/// Default port of the health endpoint exposed by desktop servers.
pub const DEFAULT_HEALTH_PORT: u16 = 6000;

/// A backend desktop server. Identity is `host`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub host: String,
    /// Port clients connect to for the desktop session.
    pub port: u16,
    /// Maximum concurrent sessions.
    pub capacity: u32,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16, capacity: u32) -> Self {
        Self {
            host: host.into(),
            port,
            capacity,
        }
    }

    /// Address of the node's health endpoint (`host:health_port`).
    pub fn health_address(&self, health_port: u16) -> String {
        format!("{}:{}", self.host, health_port)
    }
}
