//! deskbroker-health: health monitoring for desktop servers.
//!
//! Probes every registered node on a fixed period and records the outcome
//! in the shared `NodeHealthTracker`. Probes run concurrently and each one
//! enforces its own timeout, so an unreachable node never holds up the
//! assessment of the others.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── run_cycle(): one JoinSet task per node
//!   │   ├── NodeProber::probe() under tokio::time::timeout
//!   │   └── NodeHealthTracker::set_health()
//!   └── run(): periodic loop until shutdown
//! ```
//!
//! The prober is a trait so tests can inject fakes; `HttpProber` issues
//! `GET /health` over HTTP/1.1 and reads optional `{"metrics": {...}}`.

pub mod monitor;
pub mod prober;

pub use monitor::{CycleReport, HealthMonitor};
pub use prober::{HttpProber, NodeProber, ProbeError, ProbeFuture, ProbeReport};
