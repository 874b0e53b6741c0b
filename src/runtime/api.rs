//! API-facing request/response models for services embedding the coordinator.

use serde::{Deserialize, Serialize};

use crate::core::{
    Conflict, Coordinator, OperationId, OperationKind, OperationRequest, RejectReason,
    RequestOutcome, SystemStatus, DEFAULT_ESTIMATED_DURATION_SECS, DEFAULT_PRIORITY,
};

/// Operation submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSubmission {
    /// Target resource.
    pub resource_id: String,
    /// Kind of work.
    pub operation_type: OperationKind,
    /// Requesting agent.
    pub agent_id: String,
    /// Priority, higher first.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Estimated duration in seconds.
    #[serde(default)]
    pub estimated_duration: Option<f64>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl From<OperationSubmission> for OperationRequest {
    fn from(sub: OperationSubmission) -> Self {
        Self {
            resource_id: sub.resource_id,
            kind: sub.operation_type,
            agent_id: sub.agent_id,
            priority: sub.priority.unwrap_or(DEFAULT_PRIORITY),
            estimated_duration_secs: sub
                .estimated_duration
                .unwrap_or(DEFAULT_ESTIMATED_DURATION_SECS),
            description: sub.description.unwrap_or_default(),
        }
    }
}

/// Scheduling status reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Holding the resource.
    Started,
    /// Waiting in the queue.
    Queued,
    /// Refused.
    Rejected,
}

/// Operation submission response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Whether the operation was started or queued.
    pub accepted: bool,
    /// Operation identifier.
    pub operation_id: OperationId,
    /// Scheduling status.
    pub status: SubmissionStatus,
    /// Reason code when rejected.
    pub reason: Option<RejectReason>,
    /// Queue position when queued.
    pub queue_position: Option<usize>,
    /// Conflicts reported with the decision.
    pub conflicts: Vec<Conflict>,
    /// Human-readable message.
    pub message: String,
}

impl From<RequestOutcome> for OperationResponse {
    fn from(outcome: RequestOutcome) -> Self {
        let accepted = outcome.accepted();
        let operation_id = outcome.operation_id();
        let reason = outcome.reject_reason();
        match outcome {
            RequestOutcome::Started {
                warnings, message, ..
            } => Self {
                accepted,
                operation_id,
                status: SubmissionStatus::Started,
                reason,
                queue_position: None,
                conflicts: warnings,
                message,
            },
            RequestOutcome::Queued {
                position,
                conflicts,
                message,
                ..
            } => Self {
                accepted,
                operation_id,
                status: SubmissionStatus::Queued,
                reason,
                queue_position: Some(position),
                conflicts,
                message,
            },
            RequestOutcome::Rejected {
                conflicts, message, ..
            } => Self {
                accepted,
                operation_id,
                status: SubmissionStatus::Rejected,
                reason,
                queue_position: None,
                conflicts,
                message,
            },
        }
    }
}

/// Completion payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Operation to complete.
    pub operation_id: OperationId,
    /// Outcome.
    pub success: bool,
    /// Failure message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Active operations.
    pub active: usize,
    /// Queued operations.
    pub queued: usize,
}

/// Submit an operation to the coordinator.
pub fn submit_operation(coordinator: &Coordinator, req: OperationSubmission) -> OperationResponse {
    coordinator.request_operation(req.into()).into()
}

/// Complete an operation. Returns `false` for unknown ids.
pub fn complete_operation(coordinator: &Coordinator, req: CompletionRequest) -> bool {
    coordinator.complete_operation(req.operation_id, req.success, req.error)
}

/// Aggregate status snapshot.
pub fn system_status(coordinator: &Coordinator) -> SystemStatus {
    coordinator.get_system_status()
}

/// Return a health payload.
pub fn health(coordinator: &Coordinator) -> Health {
    let status = coordinator.get_system_status();
    Health {
        ok: status.queued_count < coordinator.config().queue_max_size,
        active: status.active_count,
        queued: status.queued_count,
    }
}
