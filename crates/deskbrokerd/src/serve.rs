//! `serve` subcommand: wire the subsystems together and run until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use deskbroker_health::{HealthMonitor, HttpProber};
use deskbroker_scheduler::Scheduler;
use deskbroker_state::{NodeHealthTracker, StateStore};

use crate::ServeArgs;

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    info!("deskbroker starting");

    // ── Initialize subsystems ──────────────────────────────────

    // Node registry.
    let (registry, health_port) = args.nodes.resolve()?;
    let registry = Arc::new(registry);
    for node in registry.nodes() {
        info!(server = %node.host, port = node.port, capacity = node.capacity, "desktop server registered");
    }

    // Assignment store.
    if let Some(parent) = args.store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = StateStore::open(&args.store_path)?;
    info!(path = ?args.store_path, "assignment store opened");

    // Scheduler.
    let tracker = Arc::new(NodeHealthTracker::new(&registry));
    let scheduler = Arc::new(Scheduler::new(
        registry.clone(),
        tracker.clone(),
        Arc::new(store),
    ));
    scheduler.rehydrate()?;

    // Health monitor. The first cycle completes before traffic is accepted.
    let monitor = HealthMonitor::new(
        registry.clone(),
        tracker.clone(),
        Arc::new(HttpProber::new(health_port)),
    )
    .with_interval(Duration::from_secs(args.health_interval))
    .with_probe_timeout(Duration::from_secs(args.probe_timeout));
    let report = monitor.run_cycle().await;
    info!(
        healthy = report.healthy,
        unhealthy = report.unhealthy,
        "initial health check complete"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_shutdown = shutdown_rx.clone();
    let sweep_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    // Health check loop.
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    // Expired-assignment sweep loop.
    let sweep_handle = {
        let scheduler = scheduler.clone();
        let interval = Duration::from_secs(args.sweep_interval);
        tokio::spawn(async move {
            run_sweeper(scheduler, interval, sweep_shutdown).await;
        })
    };

    // ── Start gateway ──────────────────────────────────────────

    let router = deskbroker_api::build_router(scheduler);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "session broker listening");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = monitor_handle.await;
    let _ = sweep_handle.await;

    info!("deskbroker stopped");
    Ok(())
}

/// Purge lapsed assignments every `interval` until shutdown.
async fn run_sweeper(scheduler: Arc<Scheduler>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.sweep_expired() {
                    warn!(error = %e, "expired assignment sweep failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
