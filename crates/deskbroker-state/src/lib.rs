//! deskbroker-state: assignment persistence and node health tracking.
//!
//! Backed by [redb](https://docs.rs/redb), the `StateStore` keeps the
//! userId → `Assignment` mapping durable across broker restarts. Entries
//! carry an absolute expiry; lapsed entries read as absent and are removed
//! by `purge_expired`.
//!
//! The `NodeHealthTracker` is the in-memory side: per-node load counters
//! and the most recent probe outcome, shared by the scheduler and the
//! health monitor.
//!
//! # Architecture
//!
//! ```text
//! AssignmentStore (trait)
//!   └── StateStore (redb, JSON values, userId keys)
//! NodeHealthTracker
//!   └── host → NodeSlot { AtomicU64 load, RwLock<health> }
//! ```

pub mod error;
pub mod store;
pub mod tables;
pub mod tracker;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{ASSIGNMENT_TTL, AssignmentStore, PutOutcome, StateStore};
pub use tracker::NodeHealthTracker;
pub use types::*;
