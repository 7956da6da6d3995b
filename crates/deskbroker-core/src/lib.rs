//! deskbroker-core: node types, the static node registry, and broker
//! configuration.
//!
//! The registry is built once at startup from either a `broker.toml` file
//! or a `host:port[:capacity]` list and never changes afterwards.

pub mod config;
pub mod registry;
pub mod types;

pub use config::{BrokerConfig, ConfigError, NodeEntry, parse_server_list};
pub use registry::NodeRegistry;
pub use types::*;
