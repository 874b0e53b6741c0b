//! Error types for coordinator operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::OperationId;

/// Errors produced by coordinator components.
///
/// None of these cross the public request/complete API as `Err`; the
/// coordinator turns them into rejections or `false` returns.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The operation id is not known to the ledger or queue.
    #[error("unknown operation: {0}")]
    UnknownOperation(OperationId),
    /// The operation id is already holding a resource.
    #[error("operation {0} already holds a resource")]
    DuplicateOperation(OperationId),
    /// Queue is at its configured capacity.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal state was found inconsistent.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured reason code attached to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// A `critical` conflict with an active hold. Retry later.
    CriticalConflict,
    /// The wait queue is at `queue_max_size`.
    QueueFull,
    /// The coordinator hit an inconsistency while evaluating the request.
    InternalError,
}

impl RejectReason {
    /// Stable string code for logs and API payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CriticalConflict => "critical_conflict",
            Self::QueueFull => "queue_full",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
