//! Error types for the recorder
//!
//! Store-level failures are [`StoreError`]; everything a queue task can fail
//! with is a [`RecorderError`]. The binary wraps both in `anyhow` at the edge.

use crate::store::StoreError;
use rollcall_shared::{ConnectionId, IdentityId};
use thiserror::Error;

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// The event source dropped its session. Triggers a reconnect, never fatal.
    #[error("event source unavailable: {0}")]
    SourceUnavailable(String),

    /// The connection id has no mapped identity; the event is dropped.
    #[error("no identity mapped to connection '{connection_id}'")]
    IdentityUnresolved { connection_id: ConnectionId },

    /// The identity's display name never materialized within the poll budget.
    #[error("identity '{identity_id}' still has no display name after {attempts} lookups")]
    IdentityTimeout { identity_id: IdentityId, attempts: u32 },

    /// The partition could not be found or created once store retries ran out.
    #[error("partition '{key}' unavailable: {source}")]
    PartitionUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("store operation failed: {0}")]
    StoreOperationFailed(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("queue '{0}' is closed")]
    QueueClosed(&'static str),

    /// The queue was at capacity and the task was not admitted.
    #[error("queue '{0}' is full")]
    QueueFull(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RecorderError {
    /// Short label used for metrics and structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::IdentityUnresolved { .. } => "identity_unresolved",
            Self::IdentityTimeout { .. } => "identity_timeout",
            Self::PartitionUnavailable { .. } => "partition_unavailable",
            Self::StoreOperationFailed(_) => "store_operation_failed",
            Self::Cancelled => "cancelled",
            Self::QueueClosed(_) => "queue_closed",
            Self::QueueFull(_) => "queue_full",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
