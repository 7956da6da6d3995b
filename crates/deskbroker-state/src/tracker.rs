//! In-memory node health and load tracking.
//!
//! The host → slot map is built once from the registry and never mutated
//! afterwards, so lookups need no lock. Each slot holds an atomic load
//! counter and a small `RwLock`-protected health record. Load updates are
//! compare-and-swap loops; health updates replace the record wholesale so
//! readers never see a half-written probe result.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use deskbroker_core::NodeRegistry;

use crate::types::{NodeMetrics, ResourceMetrics};

#[derive(Debug, Clone, Copy)]
struct HealthRecord {
    healthy: bool,
    cpu_usage: f64,
    memory_usage: f64,
    last_health_check: Option<DateTime<Utc>>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        let initial = NodeMetrics::default();
        Self {
            healthy: initial.healthy,
            cpu_usage: initial.cpu_usage,
            memory_usage: initial.memory_usage,
            last_health_check: initial.last_health_check,
        }
    }
}

#[derive(Debug, Default)]
struct NodeSlot {
    active_sessions: AtomicU64,
    health: RwLock<HealthRecord>,
}

impl NodeSlot {
    fn health(&self) -> HealthRecord {
        *self.health.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics(&self) -> NodeMetrics {
        let health = self.health();
        NodeMetrics {
            active_sessions: self.active_sessions.load(Ordering::Acquire),
            cpu_usage: health.cpu_usage,
            memory_usage: health.memory_usage,
            last_health_check: health.last_health_check,
            healthy: health.healthy,
        }
    }
}

/// Per-node health flags, resource metrics, and session counters.
#[derive(Debug)]
pub struct NodeHealthTracker {
    slots: HashMap<String, NodeSlot>,
}

impl NodeHealthTracker {
    /// Create a tracker with every registered node healthy and idle.
    pub fn new(registry: &NodeRegistry) -> Self {
        let slots = registry
            .nodes()
            .iter()
            .map(|n| (n.host.clone(), NodeSlot::default()))
            .collect();
        Self { slots }
    }

    /// Add one session to a node. Returns `false` for unknown hosts.
    pub fn increment_load(&self, host: &str) -> bool {
        match self.slots.get(host) {
            Some(slot) => {
                slot.active_sessions.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => {
                debug!(%host, "increment for unknown node ignored");
                false
            }
        }
    }

    /// Remove one session from a node, never going below zero.
    /// Returns `false` for unknown hosts.
    pub fn decrement_load(&self, host: &str) -> bool {
        match self.slots.get(host) {
            Some(slot) => {
                // Err means the counter was already zero.
                let _ = slot.active_sessions.fetch_update(
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    |n| n.checked_sub(1),
                );
                true
            }
            None => {
                debug!(%host, "decrement for unknown node ignored");
                false
            }
        }
    }

    /// Take a session slot on a node only if it is below `capacity`.
    pub fn try_reserve(&self, host: &str, capacity: u32) -> bool {
        let Some(slot) = self.slots.get(host) else {
            return false;
        };
        slot.active_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < u64::from(capacity)).then_some(n + 1)
            })
            .is_ok()
    }

    /// Record a probe outcome. `metrics` overwrites cpu/memory when present.
    pub fn set_health(&self, host: &str, healthy: bool, metrics: Option<ResourceMetrics>) {
        let Some(slot) = self.slots.get(host) else {
            debug!(%host, "health update for unknown node ignored");
            return;
        };
        let mut record = slot.health.write().unwrap_or_else(PoisonError::into_inner);
        record.healthy = healthy;
        record.last_health_check = Some(Utc::now());
        if let Some(m) = metrics {
            record.cpu_usage = m.cpu;
            record.memory_usage = m.memory;
        }
    }

    /// Current session count for a node.
    pub fn active_sessions(&self, host: &str) -> Option<u64> {
        self.slots
            .get(host)
            .map(|s| s.active_sessions.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self, host: &str) -> Option<bool> {
        self.slots.get(host).map(|s| s.health().healthy)
    }

    /// Metrics for a single node.
    pub fn get(&self, host: &str) -> Option<NodeMetrics> {
        self.slots.get(host).map(NodeSlot::metrics)
    }

    /// Point-in-time copy of every node's metrics, keyed by host.
    pub fn snapshot(&self) -> BTreeMap<String, NodeMetrics> {
        self.slots
            .iter()
            .map(|(host, slot)| (host.clone(), slot.metrics()))
            .collect()
    }
}
