//! Scheduler: maps users to desktop servers.
//!
//! The `Scheduler` is the only writer of assignments:
//! - Returns a user's live assignment unchanged (sticky sessions)
//! - Otherwise reserves a slot on the least-loaded node and persists a
//!   new assignment
//! - Releases assignments and returns their slot to the node
//! - Rebuilds load counters from the store on startup and sweeps lapsed
//!   assignments
//!
//! A sticky assignment is never re-validated: if its node has since become
//! unhealthy, full, or unregistered, the user still gets it back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use deskbroker_core::{Node, NodeRegistry};
use deskbroker_state::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::selector::select_node;

/// Assigns users to nodes. Cheap to share behind an `Arc`.
pub struct Scheduler {
    /// The fixed node list.
    registry: Arc<NodeRegistry>,
    /// Live health and load state, shared with the health monitor.
    tracker: Arc<NodeHealthTracker>,
    /// Durable assignment storage.
    store: Arc<dyn AssignmentStore>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        registry: Arc<NodeRegistry>,
        tracker: Arc<NodeHealthTracker>,
        store: Arc<dyn AssignmentStore>,
    ) -> Self {
        Self {
            registry,
            tracker,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<NodeHealthTracker> {
        &self.tracker
    }

    /// Return the user's assignment, creating one if none is live.
    ///
    /// Fails with `NoAvailableNode` when every node is unhealthy or full.
    pub fn assign(
        &self,
        user_id: &str,
        device_id: Option<&str>,
        preferred_desktop: Option<&str>,
    ) -> SchedulerResult<Assignment> {
        // Sticky session: hand back whatever is stored, as is.
        if let Some(existing) = self.store.get(user_id)? {
            info!(%user_id, server = %existing.server, "returning existing session assignment");
            return Ok(existing);
        }

        let node = self.reserve_node()?;

        let assignment = Assignment {
            server: node.host.clone(),
            port: node.port,
            protocol: Protocol::Xdmcp,
            desktop: preferred_desktop
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_DESKTOP)
                .to_string(),
            assigned_at: Utc::now(),
        };

        let outcome = match self.store.put_if_absent(user_id, &assignment) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.tracker.decrement_load(&node.host);
                return Err(e.into());
            }
        };

        match outcome {
            PutOutcome::Inserted { expired } => {
                if let Some(old) = expired {
                    self.tracker.decrement_load(&old.server);
                    debug!(%user_id, server = %old.server, "replaced expired assignment");
                }
                info!(
                    %user_id,
                    device_id = device_id.unwrap_or("-"),
                    server = %node.host,
                    desktop = %assignment.desktop,
                    "assigned user to server"
                );
                Ok(assignment)
            }
            PutOutcome::Existing(winner) => {
                // A concurrent request for the same user got there first.
                self.tracker.decrement_load(&node.host);
                debug!(%user_id, server = %winner.server, "concurrent assignment won");
                Ok(winner)
            }
        }
    }

    /// Pick a node and take one of its session slots.
    fn reserve_node(&self) -> SchedulerResult<&Node> {
        loop {
            let node = select_node(&self.registry, &self.tracker).ok_or_else(|| {
                warn!("no available desktop servers");
                SchedulerError::NoAvailableNode
            })?;

            if self.tracker.try_reserve(&node.host, node.capacity) {
                return Ok(node);
            }
            // Filled up between selection and reservation; pick again.
            debug!(server = %node.host, "node filled concurrently, reselecting");
        }
    }

    /// Drop a user's assignment. Returns `true` if a live one existed.
    pub fn release(&self, user_id: &str) -> SchedulerResult<bool> {
        let Some(record) = self.store.delete(user_id)? else {
            debug!(%user_id, "release for unassigned user");
            return Ok(false);
        };

        let server = &record.assignment.server;
        self.tracker.decrement_load(server);

        if record.is_expired() {
            debug!(%user_id, %server, "released lapsed assignment");
            return Ok(false);
        }

        info!(%user_id, %server, "released session");
        Ok(true)
    }

    /// Every live assignment.
    pub fn sessions(&self) -> SchedulerResult<Vec<(UserId, Assignment)>> {
        Ok(self.store.list_all()?)
    }

    /// Current metrics for every node, keyed by host.
    pub fn node_metrics(&self) -> BTreeMap<String, NodeMetrics> {
        self.tracker.snapshot()
    }

    /// Count persisted assignments into the load counters.
    ///
    /// Run once at startup so a restarted broker does not see loaded
    /// nodes as idle. Expired records that are still stored are counted
    /// too: the sweep, a release, or a replacement will decrement them
    /// later. Assignments for unregistered hosts are skipped.
    pub fn rehydrate(&self) -> SchedulerResult<usize> {
        let mut restored = 0;
        for (user_id, record) in self.store.list_records()? {
            let server = &record.assignment.server;
            if self.tracker.increment_load(server) {
                restored += 1;
            } else {
                warn!(%user_id, %server, "persisted assignment references unknown server");
            }
        }
        info!(restored, "load counters rehydrated from store");
        Ok(restored)
    }

    /// Purge lapsed assignments and give their slots back.
    pub fn sweep_expired(&self) -> SchedulerResult<usize> {
        let purged = self.store.purge_expired()?;
        for (user_id, assignment) in &purged {
            self.tracker.decrement_load(&assignment.server);
            debug!(%user_id, server = %assignment.server, "assignment expired");
        }
        if !purged.is_empty() {
            info!(count = purged.len(), "expired assignments swept");
        }
        Ok(purged.len())
    }
}
