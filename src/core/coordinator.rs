//! Conflict-aware operation coordinator.
//!
//! The coordinator owns the resource registry, the allocation ledger, and the
//! wait queue behind a single `parking_lot::Mutex`. Every public mutating call
//! is one short critical section: no I/O and no `.await` happen while the lock
//! is held. The work an operation stands for (stopping a container, loading a
//! model onto a GPU) happens outside, driven by the caller; the coordinator
//! only grants permission and tracks it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::CoordinatorConfig;
use crate::core::conflict::max_severity;
use crate::core::queue::OperationQueue;
use crate::core::{
    build_audit_event, AllocationLedger, AuditAction, AuditSink, Conflict, ConflictDetector,
    ConflictMatrix, ConflictSeverity, ConflictSource, CoordinatorError, ManagedResource,
    Operation, OperationId, OperationKind, OperationRequest, OperationStatus, RejectReason,
    ResourceRegistry, ResourceSpec, ResourceState, SeverityPolicy,
};
use crate::infra::queue::InMemoryQueue;
use crate::util::clock::{Clock, SystemClock};

/// Result of [`Coordinator::request_operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// The operation holds its resource now. `warnings` lists any
    /// `low`/`medium` conflicts the caller should be careful about.
    Started {
        /// Identifier to pass to `complete_operation`.
        operation_id: OperationId,
        /// Minor conflicts, empty when none.
        warnings: Vec<Conflict>,
        /// Human-readable summary.
        message: String,
    },
    /// The operation waits behind a `high` conflict and will be promoted by a
    /// later drain pass.
    Queued {
        /// Identifier to pass to `complete_operation` once promoted.
        operation_id: OperationId,
        /// Zero-based queue position at enqueue time.
        position: usize,
        /// Conflicts that caused the wait.
        conflicts: Vec<Conflict>,
        /// Human-readable summary.
        message: String,
    },
    /// The operation was refused.
    Rejected {
        /// Identifier of the refused operation, for audit correlation.
        operation_id: OperationId,
        /// Structured reason code.
        reason: RejectReason,
        /// Conflicts that caused a `critical_conflict` rejection.
        conflicts: Vec<Conflict>,
        /// Human-readable summary.
        message: String,
    },
}

impl RequestOutcome {
    /// `true` for started and queued outcomes.
    pub const fn accepted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Whether the operation holds its resource now.
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }

    /// Whether the operation is waiting in the queue.
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Self::Started { message, .. }
            | Self::Queued { message, .. }
            | Self::Rejected { message, .. } => message,
        }
    }

    /// Operation identifier.
    pub const fn operation_id(&self) -> OperationId {
        match self {
            Self::Started { operation_id, .. }
            | Self::Queued { operation_id, .. }
            | Self::Rejected { operation_id, .. } => *operation_id,
        }
    }

    /// Reason code when rejected.
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Conflicts reported with the outcome.
    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Self::Started { warnings, .. } => warnings,
            Self::Queued { conflicts, .. } | Self::Rejected { conflicts, .. } => conflicts,
        }
    }
}

/// Everything the coordinator lock protects.
pub(crate) struct CoordinatorState {
    pub(crate) registry: ResourceRegistry,
    pub(crate) ledger: AllocationLedger,
    pub(crate) queue: Box<dyn OperationQueue>,
    /// Terminal operations that never reached the ledger (rejected, flushed).
    pub(crate) archive: HashMap<OperationId, Operation>,
    next_sequence: u64,
}

/// Resource-allocation and conflict-prevention scheduler.
///
/// Construct one per host service and share it by `Arc`; there is no global
/// instance.
pub struct Coordinator {
    config: CoordinatorConfig,
    matrix: ConflictMatrix,
    clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<CoordinatorState>,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
}

impl Coordinator {
    /// Coordinator with the standard conflict matrix, the system clock, and an
    /// in-memory queue sized from `config`.
    pub fn new(config: CoordinatorConfig) -> Self {
        let queue = Box::new(InMemoryQueue::new(config.queue_max_size));
        Self::from_parts(
            config,
            ConflictMatrix::standard(),
            Arc::new(SystemClock),
            queue,
            None,
        )
    }

    /// Assemble a coordinator from explicit components.
    pub fn from_parts(
        config: CoordinatorConfig,
        matrix: ConflictMatrix,
        clock: Arc<dyn Clock>,
        queue: Box<dyn OperationQueue>,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Self {
        tracing::info!(
            queue_max_size = config.queue_max_size,
            operation_timeout_seconds = config.operation_timeout_seconds,
            "coordinator initialized"
        );
        Self {
            config,
            matrix,
            clock,
            state: Mutex::new(CoordinatorState {
                registry: ResourceRegistry::new(),
                ledger: AllocationLedger::new(),
                queue,
                archive: HashMap::new(),
                next_sequence: 0,
            }),
            audit: audit.map(Mutex::new),
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Conflict matrix in use.
    pub const fn matrix(&self) -> &ConflictMatrix {
        &self.matrix
    }

    pub(crate) fn now_ms(&self) -> u128 {
        self.clock.now_ms()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a resource with its ports and dependency edges. Returns
    /// `false` if it is already known; callers treat that as a no-op.
    pub fn register_resource(
        &self,
        id: impl Into<String>,
        ports: Vec<u16>,
        dependencies: Vec<String>,
    ) -> bool {
        let spec = ResourceSpec {
            id: id.into(),
            ports,
            dependencies: dependencies.into_iter().collect(),
            ..ResourceSpec::default()
        };
        self.register(spec)
    }

    /// Register a resource from a full spec.
    pub fn register(&self, spec: ResourceSpec) -> bool {
        let now = self.now_ms();
        self.state.lock().registry.register(spec, now)
    }

    /// Overwrite a resource's state and health, registering it if needed.
    pub fn update_resource_state(
        &self,
        id: &str,
        state: ResourceState,
        health: impl Into<String>,
    ) -> bool {
        let now = self.now_ms();
        self.state.lock().registry.update_state(id, state, health, now)
    }

    /// Current state of a resource.
    pub fn get_resource_state(&self, id: &str) -> Option<ResourceState> {
        self.state.lock().registry.get_state(id)
    }

    /// Snapshot of a resource record.
    pub fn resource(&self, id: &str) -> Option<ManagedResource> {
        self.state.lock().registry.get(id).cloned()
    }

    /// State of every known resource.
    pub fn list_resource_states(&self) -> std::collections::BTreeMap<String, ResourceState> {
        self.state.lock().registry.list_states()
    }

    /// Ids of resources in `state`.
    pub fn resources_in_state(&self, state: ResourceState) -> Vec<String> {
        self.state.lock().registry.resources_in_state(state)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Evaluate a request against the conflict matrix and either start it,
    /// queue it, or reject it.
    pub fn request_operation(&self, request: OperationRequest) -> RequestOutcome {
        let now = self.now_ms();
        let mut state = self.state.lock();

        state.registry.ensure(&request.resource_id, now);

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let operation = Operation::from_request(request, now, sequence);
        let operation_id = operation.id;

        match self.evaluate(&mut state, operation, now) {
            Ok(outcome) => outcome,
            Err((err, mut operation)) => {
                tracing::error!(operation = %operation_id, error = %err, "request evaluation failed");
                let message = format!("Internal error: {err}");
                operation.status = OperationStatus::Rejected;
                operation.error = Some(message.clone());
                operation.finished_at_ms = Some(now);
                self.emit(&operation, AuditAction::Reject, Some(message.clone()), now);
                state.archive.insert(operation_id, operation);
                RequestOutcome::Rejected {
                    operation_id,
                    reason: RejectReason::InternalError,
                    conflicts: Vec::new(),
                    message,
                }
            }
        }
    }

    fn evaluate(
        &self,
        state: &mut CoordinatorState,
        mut operation: Operation,
        now: u128,
    ) -> Result<RequestOutcome, (CoordinatorError, Operation)> {
        let operation_id = operation.id;
        let conflicts = self.conflicts_for(state, &operation.resource_id, operation.kind);
        let worst = max_severity(&conflicts);

        match worst.policy() {
            SeverityPolicy::Reject => {
                let message = format!(
                    "Critical conflicts detected: {}",
                    describe_conflicts(&conflicts)
                );
                tracing::warn!(
                    operation = %operation_id,
                    resource = %operation.resource_id,
                    kind = %operation.kind,
                    agent = %operation.agent_id,
                    conflicts = conflicts.len(),
                    "operation rejected: critical conflict"
                );
                self.reject(state, operation, &message, now);
                Ok(RequestOutcome::Rejected {
                    operation_id,
                    reason: RejectReason::CriticalConflict,
                    conflicts,
                    message,
                })
            }
            SeverityPolicy::Queue => {
                if state.queue.is_full() {
                    let message = format!(
                        "Queue full ({} operations); operation rejected",
                        state.queue.max_depth()
                    );
                    tracing::warn!(
                        operation = %operation_id,
                        resource = %operation.resource_id,
                        depth = state.queue.len(),
                        "operation rejected: queue full"
                    );
                    self.reject(state, operation, &message, now);
                    return Ok(RequestOutcome::Rejected {
                        operation_id,
                        reason: RejectReason::QueueFull,
                        conflicts,
                        message,
                    });
                }

                operation.status = OperationStatus::Queued;
                let detail = describe_conflicts(&conflicts);
                let snapshot = operation.clone();
                let position = match state.queue.enqueue(operation) {
                    Ok(position) => position,
                    Err(CoordinatorError::QueueFull(reason)) => {
                        let message = format!("Queue full: {reason}");
                        self.reject(state, snapshot, &message, now);
                        return Ok(RequestOutcome::Rejected {
                            operation_id,
                            reason: RejectReason::QueueFull,
                            conflicts,
                            message,
                        });
                    }
                    Err(err) => return Err((err, snapshot)),
                };
                tracing::info!(
                    operation = %operation_id,
                    resource = %snapshot.resource_id,
                    kind = %snapshot.kind,
                    priority = snapshot.priority,
                    position,
                    "operation queued"
                );
                self.emit(&snapshot, AuditAction::Enqueue, Some(detail.clone()), now);
                Ok(RequestOutcome::Queued {
                    operation_id,
                    position,
                    message: format!(
                        "Operation queued at position {position} due to {} conflict(s): {detail}",
                        conflicts.len()
                    ),
                    conflicts,
                })
            }
            SeverityPolicy::Execute | SeverityPolicy::ExecuteWithWarning => {
                let snapshot = operation.clone();
                self.acquire(state, operation, now)
                    .map_err(|err| (err, snapshot.clone()))?;

                if conflicts.is_empty() {
                    self.emit(&snapshot, AuditAction::Start, None, now);
                    tracing::info!(
                        operation = %operation_id,
                        resource = %snapshot.resource_id,
                        kind = %snapshot.kind,
                        agent = %snapshot.agent_id,
                        "operation started"
                    );
                    Ok(RequestOutcome::Started {
                        operation_id,
                        warnings: conflicts,
                        message: format!(
                            "Operation {} started on {}",
                            snapshot.kind, snapshot.resource_id
                        ),
                    })
                } else {
                    let detail = describe_conflicts(&conflicts);
                    self.emit(&snapshot, AuditAction::StartWithWarning, Some(detail.clone()), now);
                    tracing::info!(
                        operation = %operation_id,
                        resource = %snapshot.resource_id,
                        kind = %snapshot.kind,
                        severity = %worst,
                        "operation started with warnings"
                    );
                    Ok(RequestOutcome::Started {
                        operation_id,
                        message: format!(
                            "Operation {} started on {} with warning: {} minor conflict(s): {detail}",
                            snapshot.kind,
                            snapshot.resource_id,
                            conflicts.len()
                        ),
                        warnings: conflicts,
                    })
                }
            }
        }
    }

    fn reject(&self, state: &mut CoordinatorState, mut operation: Operation, message: &str, now: u128) {
        operation.status = OperationStatus::Rejected;
        operation.error = Some(message.to_string());
        operation.finished_at_ms = Some(now);
        self.emit(&operation, AuditAction::Reject, Some(message.to_string()), now);
        state.archive.insert(operation.id, operation);
    }

    fn acquire(
        &self,
        state: &mut CoordinatorState,
        operation: Operation,
        now: u128,
    ) -> Result<(), CoordinatorError> {
        let holding = state.ledger.holds(&operation.resource_id).len();
        if holding >= self.config.max_concurrent_operations_per_resource {
            tracing::warn!(
                resource = %operation.resource_id,
                holding,
                limit = self.config.max_concurrent_operations_per_resource,
                "resource above its concurrent operation guideline"
            );
        }
        state.ledger.acquire(operation, now)
    }

    /// Conflict set an operation of `kind` on `resource_id` faces: direct
    /// matrix conflicts with every active hold, plus a `high` dependency
    /// conflict for each dependency being stopped or restarted.
    pub(crate) fn conflicts_for(
        &self,
        state: &CoordinatorState,
        resource_id: &str,
        kind: OperationKind,
    ) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = state
            .ledger
            .active_on(resource_id)
            .filter_map(|active| {
                let severity = self.matrix.severity(active.kind, kind);
                (severity > ConflictSeverity::None).then(|| Conflict {
                    operation_id: active.id,
                    kind: active.kind,
                    agent_id: active.agent_id.clone(),
                    severity,
                    source: ConflictSource::Direct,
                })
            })
            .collect();

        if let Some(resource) = state.registry.get(resource_id) {
            for dependency in &resource.dependencies {
                conflicts.extend(
                    state
                        .ledger
                        .active_on(dependency)
                        .filter(|active| active.kind.disrupts_dependents())
                        .map(|active| Conflict {
                            operation_id: active.id,
                            kind: active.kind,
                            agent_id: active.agent_id.clone(),
                            severity: ConflictSeverity::High,
                            source: ConflictSource::Dependency {
                                resource_id: dependency.clone(),
                            },
                        }),
                );
            }
        }

        conflicts.sort_by(|a, b| b.severity.cmp(&a.severity));
        conflicts
    }

    /// Release an operation's hold and re-evaluate the queue.
    ///
    /// Returns `false` (and logs) if the id holds nothing; queued operations
    /// cannot be completed before they are promoted.
    pub fn complete_operation(&self, id: OperationId, success: bool, error: Option<String>) -> bool {
        let now = self.now_ms();
        let mut state = self.state.lock();
        let action = if success {
            AuditAction::Complete
        } else {
            AuditAction::Fail
        };
        if !self.release(&mut state, id, success, error, action, now) {
            return false;
        }
        self.drain(&mut state, now);
        true
    }

    pub(crate) fn release(
        &self,
        state: &mut CoordinatorState,
        id: OperationId,
        success: bool,
        error: Option<String>,
        action: AuditAction,
        now: u128,
    ) -> bool {
        let Some(operation) = state.ledger.release(id, success, error, now) else {
            tracing::warn!(operation = %id, "complete requested for unknown operation");
            return false;
        };
        tracing::info!(
            operation = %id,
            resource = %operation.resource_id,
            kind = %operation.kind,
            success,
            held_ms = ?operation.held_ms(now),
            "operation finished"
        );
        self.emit(&operation, action, operation.error.clone(), now);
        true
    }

    /// Promote every queued operation whose conflicts have dropped below
    /// `high`, scanning in priority order. Returns the promoted ids in
    /// promotion order.
    pub fn drain_queue(&self) -> Vec<OperationId> {
        let now = self.now_ms();
        let mut state = self.state.lock();
        self.drain(&mut state, now)
    }

    pub(crate) fn drain(&self, state: &mut CoordinatorState, now: u128) -> Vec<OperationId> {
        let candidates: Vec<(OperationId, String, OperationKind)> = state
            .queue
            .iter()
            .map(|op| (op.id, op.resource_id.clone(), op.kind))
            .collect();

        let mut promoted = Vec::new();
        for (id, resource_id, kind) in candidates {
            let conflicts = self.conflicts_for(state, &resource_id, kind);
            let worst = max_severity(&conflicts);
            if worst >= ConflictSeverity::High {
                tracing::debug!(operation = %id, resource = %resource_id, severity = %worst, "still blocked");
                continue;
            }
            let Some(operation) = state.queue.remove(&id) else {
                continue;
            };
            let snapshot = operation.clone();
            if let Err(err) = self.acquire(state, operation, now) {
                tracing::error!(operation = %id, error = %err, "failed to promote queued operation");
                continue;
            }
            tracing::info!(
                operation = %id,
                resource = %resource_id,
                kind = %kind,
                priority = snapshot.priority,
                waited_ms = %snapshot.age_ms(now),
                "queued operation promoted"
            );
            let detail = (!conflicts.is_empty()).then(|| describe_conflicts(&conflicts));
            self.emit(&snapshot, AuditAction::Promote, detail, now);
            promoted.push(id);
        }
        promoted
    }

    /// Emergency escape hatch: clear every hold on `resource_id` without any
    /// conflict check, mark those operations `force_cancelled`, then drain.
    /// Returns `true` if any hold was cleared.
    pub fn force_unlock(&self, resource_id: &str, reason: &str) -> bool {
        let reason = if reason.is_empty() {
            "force unlock"
        } else {
            reason
        };
        let now = self.now_ms();
        let mut state = self.state.lock();
        let cancelled = state.ledger.force_release(resource_id, reason, now);
        tracing::warn!(
            resource = %resource_id,
            reason,
            cancelled = cancelled.len(),
            "force unlock invoked, bypassing conflict checks"
        );
        for operation in &cancelled {
            self.emit(operation, AuditAction::ForceCancel, Some(reason.to_string()), now);
        }
        self.drain(&mut state, now);
        !cancelled.is_empty()
    }

    /// Cancel every queued operation targeting `resource_id`. Returns how
    /// many were removed.
    pub fn flush_queue(&self, resource_id: &str, reason: &str) -> usize {
        let now = self.now_ms();
        let mut state = self.state.lock();
        let removed = state
            .queue
            .remove_where(&mut |op| op.resource_id == resource_id);
        tracing::warn!(
            resource = %resource_id,
            reason,
            flushed = removed.len(),
            "queued operations flushed"
        );
        let count = removed.len();
        for mut operation in removed {
            operation.status = OperationStatus::ForceCancelled;
            operation.error = Some(reason.to_string());
            operation.finished_at_ms = Some(now);
            self.emit(&operation, AuditAction::ForceCancel, Some(reason.to_string()), now);
            state.archive.insert(operation.id, operation);
        }
        count
    }

    /// Whether any operation holds `resource_id`.
    pub fn is_resource_locked(&self, resource_id: &str) -> bool {
        self.state.lock().ledger.is_locked(resource_id)
    }

    pub(crate) fn emit(
        &self,
        operation: &Operation,
        action: AuditAction,
        detail: Option<String>,
        now: u128,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(build_audit_event(operation, action, detail, now));
        }
    }
}

impl ConflictDetector for Coordinator {
    fn detect_conflicts(&self, resource_id: &str, kind: OperationKind) -> Vec<Conflict> {
        let state = self.state.lock();
        self.conflicts_for(&state, resource_id, kind)
    }

    fn is_resource_locked(&self, resource_id: &str) -> bool {
        Self::is_resource_locked(self, resource_id)
    }
}

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    let mut out = String::new();
    for (i, conflict) in conflicts.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{conflict}");
    }
    out
}
