//! Health monitor: background task that probes every desktop server.
//!
//! Each cycle fans out one task per node. A probe that fails, errors, or
//! exceeds the probe timeout marks only its own node unhealthy; the cycle
//! always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use deskbroker_core::{Node, NodeRegistry};
use deskbroker_state::{NodeHealthTracker, ResourceMetrics};

use crate::prober::{NodeProber, ProbeError};

/// Time between probe cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on a single node probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Periodically probes all registered nodes and records the results.
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    tracker: Arc<NodeHealthTracker>,
    prober: Arc<dyn NodeProber>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor with the default 30s period and 5s probe timeout.
    pub fn new(
        registry: Arc<NodeRegistry>,
        tracker: Arc<NodeHealthTracker>,
        prober: Arc<dyn NodeProber>,
    ) -> Self {
        Self {
            registry,
            tracker,
            prober,
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe every node concurrently and wait for all verdicts.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut probes = JoinSet::new();

        for node in self.registry.nodes() {
            let node = node.clone();
            let prober = Arc::clone(&self.prober);
            let tracker = Arc::clone(&self.tracker);
            let timeout = self.probe_timeout;

            probes.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, prober.probe(&node)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(timeout)),
                };
                record_outcome(&tracker, &node, outcome.map(|r| r.metrics))
            });
        }

        let mut report = CycleReport::default();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(true) => report.healthy += 1,
                Ok(false) => report.unhealthy += 1,
                Err(e) => {
                    error!(error = %e, "health probe task failed");
                    report.unhealthy += 1;
                }
            }
        }

        debug!(
            healthy = report.healthy,
            unhealthy = report.unhealthy,
            "health check cycle complete"
        );
        report
    }

    /// Run a cycle every `interval` until `shutdown` flips.
    ///
    /// The first cycle fires one interval after the call; the daemon runs
    /// the startup cycle itself before accepting traffic.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, nodes = self.registry.len(), "health monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    debug!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}

/// Apply one probe outcome to the tracker. Returns the resulting health.
fn record_outcome(
    tracker: &NodeHealthTracker,
    node: &Node,
    outcome: Result<Option<ResourceMetrics>, ProbeError>,
) -> bool {
    match outcome {
        Ok(metrics) => {
            if tracker.is_healthy(&node.host) == Some(false) {
                info!(server = %node.host, "desktop server recovered");
            }
            tracker.set_health(&node.host, true, metrics);
            true
        }
        Err(e) => {
            warn!(server = %node.host, error = %e, "desktop server health check failed");
            tracker.set_health(&node.host, false, None);
            false
        }
    }
}
