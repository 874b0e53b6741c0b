//! Operation (hold request) model.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::OperationKind;

/// Default priority for requests that do not set one.
pub const DEFAULT_PRIORITY: i32 = 5;
/// Default estimated duration in seconds.
pub const DEFAULT_ESTIMATED_DURATION_SECS: f64 = 60.0;

/// Unique operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OperationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle status of an operation.
///
/// `pending -> {active | queued | rejected}`,
/// `active -> {completed | failed | force_cancelled}`,
/// `queued -> {active | rejected | force_cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Created, not yet evaluated.
    Pending,
    /// Holding its resource.
    Active,
    /// Waiting in the priority queue.
    Queued,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully, including timeouts.
    Failed,
    /// Administratively cancelled.
    ForceCancelled,
    /// Refused at request time.
    Rejected,
}

impl OperationStatus {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::ForceCancelled | Self::Rejected
        )
    }
}

/// An operation tracked by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier.
    pub id: OperationId,
    /// Target resource.
    pub resource_id: String,
    /// Kind of work.
    pub kind: OperationKind,
    /// Requesting agent.
    pub agent_id: String,
    /// Creation timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
    /// When the operation acquired its hold.
    pub started_at_ms: Option<u128>,
    /// When the operation reached a terminal status.
    pub finished_at_ms: Option<u128>,
    /// Caller's estimate of how long the work takes, in seconds.
    pub estimated_duration_secs: f64,
    /// Higher is more urgent.
    pub priority: i32,
    /// Human-readable description.
    pub description: String,
    /// Current status.
    pub status: OperationStatus,
    /// Failure or cancellation reason.
    pub error: Option<String>,
    /// Arrival order, breaks ties between equal timestamps.
    pub sequence: u64,
}

impl Operation {
    /// Build a pending operation from a request.
    pub fn from_request(request: OperationRequest, created_at_ms: u128, sequence: u64) -> Self {
        Self {
            id: OperationId::new(),
            resource_id: request.resource_id,
            kind: request.kind,
            agent_id: request.agent_id,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            estimated_duration_secs: request.estimated_duration_secs,
            priority: request.priority,
            description: request.description,
            status: OperationStatus::Pending,
            error: None,
            sequence,
        }
    }

    /// Milliseconds since creation.
    pub fn age_ms(&self, now_ms: u128) -> u128 {
        now_ms.saturating_sub(self.created_at_ms)
    }

    /// Milliseconds spent holding the resource, if it ever started.
    pub fn held_ms(&self, now_ms: u128) -> Option<u128> {
        self.started_at_ms
            .map(|start| self.finished_at_ms.unwrap_or(now_ms).saturating_sub(start))
    }
}

/// Parameters of a new operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Target resource.
    pub resource_id: String,
    /// Kind of work.
    pub kind: OperationKind,
    /// Requesting agent.
    pub agent_id: String,
    /// Higher is more urgent.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Estimated duration in seconds.
    #[serde(default = "default_estimated_duration")]
    pub estimated_duration_secs: f64,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

const fn default_estimated_duration() -> f64 {
    DEFAULT_ESTIMATED_DURATION_SECS
}

impl OperationRequest {
    /// Request with default priority, duration, and description.
    pub fn new(
        resource_id: impl Into<String>,
        kind: OperationKind,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
            agent_id: agent_id.into(),
            priority: DEFAULT_PRIORITY,
            estimated_duration_secs: DEFAULT_ESTIMATED_DURATION_SECS,
            description: String::new(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the estimated duration in seconds.
    #[must_use]
    pub fn with_estimated_duration(mut self, secs: f64) -> Self {
        self.estimated_duration_secs = secs;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
