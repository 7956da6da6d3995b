//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no available desktop servers")]
    NoAvailableNode,

    #[error("state store error: {0}")]
    State(#[from] deskbroker_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
