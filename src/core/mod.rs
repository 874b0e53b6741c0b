//! Core scheduling abstractions: conflict evaluation and hold accounting.

pub mod audit;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod operation;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod status;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, ChannelAuditSink, InMemoryAuditSink,
};
pub use conflict::{
    max_severity, Conflict, ConflictDetector, ConflictMatrix, ConflictSeverity, ConflictSource,
    OperationKind, SeverityPolicy,
};
pub use coordinator::{Coordinator, RequestOutcome};
pub use error::{AppResult, CoordinatorError, RejectReason};
pub use ledger::{AllocationLedger, HistoryEventKind, HistoryRecord};
pub use operation::{
    Operation, OperationId, OperationRequest, OperationStatus, DEFAULT_ESTIMATED_DURATION_SECS,
    DEFAULT_PRIORITY,
};
pub use queue::{queue_key, OperationQueue};
#[cfg(feature = "tokio-runtime")]
pub use reaper::ReaperHandle;
pub use reaper::{
    RecoveryHandler, Spawn, SweepReport, TimeoutReaper, AUTO_RECOVERY_AGENT,
    AUTO_RECOVERY_PRIORITY, TIMEOUT_ERROR,
};
pub use registry::{ManagedResource, ResourceRegistry, ResourceSpec, ResourceState};
pub use status::{ResourceStatus, SystemStatus, RECENT_WINDOW_MS};
