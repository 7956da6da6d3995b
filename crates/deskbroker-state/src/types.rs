//! Domain types for assignments and node metrics.
//!
//! Field names serialize in camelCase to match the broker's JSON surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a user (opaque, supplied by the caller).
pub type UserId = String;

/// Desktop environment used when the request does not name one.
pub const DEFAULT_DESKTOP: &str = "xfce";

// ── Assignment ────────────────────────────────────────────────────

/// Remote-desktop transport handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Primary transport (X11 sessions).
    #[default]
    Xdmcp,
    /// Fallback transport (Wayland sessions).
    Rdp,
}

/// Binding of a user to a desktop server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Host of the assigned node.
    pub server: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Requested desktop environment.
    pub desktop: String,
    pub assigned_at: DateTime<Utc>,
}

/// An assignment as persisted, with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssignment {
    pub assignment: Assignment,
    /// Unix timestamp (milliseconds) after which the entry is gone.
    pub expires_at_ms: i64,
}

impl StoredAssignment {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

// ── Node metrics ──────────────────────────────────────────────────

/// Resource usage reported by a node's health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetrics {
    pub cpu: f64,
    pub memory: f64,
}

/// Point-in-time view of a node's health and load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub active_sessions: u64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub last_health_check: Option<DateTime<Utc>>,
    /// Outcome of the most recent probe only.
    pub healthy: bool,
}

impl Default for NodeMetrics {
    /// Unprobed nodes start out healthy with no load.
    fn default() -> Self {
        Self {
            active_sessions: 0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            last_health_check: None,
            healthy: true,
        }
    }
}
