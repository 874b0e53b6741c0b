//! Audit sink implementations.
//!
//! The coordinator emits one [`AuditEvent`] per scheduling decision. Sinks are
//! passive: an in-memory ring for tests and dashboards, and a channel sink for
//! hosts that forward events to their own logging pipeline.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Operation, OperationId};

/// Scheduling decision recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Hold granted immediately.
    Start,
    /// Hold granted with minor-conflict warnings.
    StartWithWarning,
    /// Parked in the wait queue.
    Enqueue,
    /// Promoted from the queue by a drain pass.
    Promote,
    /// Refused.
    Reject,
    /// Released successfully.
    Complete,
    /// Released unsuccessfully.
    Fail,
    /// Failed by the timeout reaper.
    Expire,
    /// Cleared by a force unlock or queue flush.
    ForceCancel,
}

impl AuditAction {
    /// Snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::StartWithWarning => "start_with_warning",
            Self::Enqueue => "enqueue",
            Self::Promote => "promote",
            Self::Reject => "reject",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Expire => "expire",
            Self::ForceCancel => "force_cancel",
        }
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: Uuid,
    /// Related operation.
    pub operation_id: OperationId,
    /// Target resource.
    pub resource_id: String,
    /// Requesting agent.
    pub agent_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (conflict list, error message, reason).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that forwards events over a bounded crossbeam channel.
///
/// Events are dropped (with a warning) when the receiver lags, so a slow
/// consumer never stalls the scheduler.
pub struct ChannelAuditSink {
    tx: Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<AuditEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&mut self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(operation = %event.operation_id, "audit channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("audit channel receiver dropped");
            }
        }
    }
}

/// Helper to build an audit event from an operation.
pub fn build_audit_event(
    operation: &Operation,
    action: AuditAction,
    detail: Option<String>,
    created_at_ms: u128,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4(),
        operation_id: operation.id,
        resource_id: operation.resource_id.clone(),
        agent_id: operation.agent_id.clone(),
        action,
        created_at_ms,
        detail,
    }
}
