//! deskbroker-scheduler: assigns users to desktop servers.
//!
//! The scheduler:
//!
//! - Returns an existing (sticky) assignment untouched when one is live
//! - Otherwise picks the healthy node with the lowest load ratio
//!   (`active_sessions / capacity`), ties going to registry order
//! - Persists new assignments and keeps per-node load counters in step
//! - Releases assignments idempotently and sweeps lapsed ones
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── NodeRegistry (fixed node list, order = tie-break)
//!   ├── NodeHealthTracker (health flags + atomic load counters)
//!   └── AssignmentStore (durable userId → Assignment, 12h TTL)
//! ```

pub mod error;
pub mod scheduler;
pub mod selector;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::Scheduler;
pub use selector::select_node;
