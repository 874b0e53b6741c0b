//! Conflict matrix: the single source of truth for scheduling decisions.
//!
//! Every pair of [`OperationKind`]s maps to a [`ConflictSeverity`]. Entries are
//! stored under both orderings of the pair, so lookups are symmetric no matter
//! which side the incoming request is on.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::OperationId;

/// Kinds of operations an agent can request against a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read-only inspection.
    Read,
    /// Configuration change applied in place.
    ConfigUpdate,
    /// Restart of the resource.
    Restart,
    /// Stop the resource.
    Stop,
    /// Start the resource.
    Start,
    /// Roll out a new version.
    Deploy,
    /// Change replica count or allocation size.
    Scale,
    /// Liveness/readiness probe.
    HealthCheck,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Read,
        Self::ConfigUpdate,
        Self::Restart,
        Self::Stop,
        Self::Start,
        Self::Deploy,
        Self::Scale,
        Self::HealthCheck,
    ];

    /// Snake-case name used in messages and serialized payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ConfigUpdate => "config_update",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Deploy => "deploy",
            Self::Scale => "scale",
            Self::HealthCheck => "health_check",
        }
    }

    /// Whether an active hold of this kind blocks work on resources that
    /// depend on the held resource.
    pub const fn disrupts_dependents(self) -> bool {
        matches!(self, Self::Stop | Self::Restart)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of running two operations concurrently on one resource.
///
/// Ordering is derived from the discriminant: `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConflictSeverity {
    /// Fully concurrent.
    #[default]
    None = 0,
    /// Concurrent, with a warning.
    Low = 1,
    /// Concurrent, with a warning.
    Medium = 2,
    /// Incoming request waits in the queue.
    High = 3,
    /// Incoming request is rejected.
    Critical = 4,
}

/// What the scheduler does with a request given its worst conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityPolicy {
    /// Run immediately, no annotation.
    Execute,
    /// Run immediately and tell the caller about the minor conflicts.
    ExecuteWithWarning,
    /// Park in the priority queue until the conflicting hold is released.
    Queue,
    /// Refuse outright.
    Reject,
}

impl ConflictSeverity {
    /// Integer rank of the severity.
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Scheduling policy implied by this severity.
    pub const fn policy(self) -> SeverityPolicy {
        match self {
            Self::None => SeverityPolicy::Execute,
            Self::Low | Self::Medium => SeverityPolicy::ExecuteWithWarning,
            Self::High => SeverityPolicy::Queue,
            Self::Critical => SeverityPolicy::Reject,
        }
    }

    /// Snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symmetric lookup table from operation-kind pairs to severities.
#[derive(Debug, Clone, Default)]
pub struct ConflictMatrix {
    entries: HashMap<(OperationKind, OperationKind), ConflictSeverity>,
}

impl ConflictMatrix {
    /// Empty matrix: every pair resolves to [`ConflictSeverity::None`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Matrix seeded with the default container/GPU policy.
    pub fn standard() -> Self {
        use ConflictSeverity::{Critical, High, Low, Medium, None};
        use OperationKind::{ConfigUpdate, Deploy, HealthCheck, Read, Restart, Scale, Start, Stop};

        let mut m = Self::new();

        m.set(Restart, Restart, Critical);
        m.set(Restart, Stop, Critical);
        m.set(Stop, Stop, Critical);
        m.set(Deploy, Restart, Critical);
        m.set(Deploy, Stop, Critical);
        m.set(Deploy, Deploy, Critical);
        m.set(Start, Stop, Critical);
        m.set(Start, Restart, Critical);

        m.set(ConfigUpdate, Restart, High);
        m.set(ConfigUpdate, Deploy, High);
        m.set(ConfigUpdate, Stop, High);
        m.set(Scale, Restart, High);
        m.set(Scale, Deploy, High);
        m.set(Scale, Stop, High);
        m.set(Scale, Scale, High);
        m.set(Start, Start, High);
        m.set(Start, Deploy, High);

        m.set(ConfigUpdate, ConfigUpdate, Medium);
        m.set(ConfigUpdate, Scale, Medium);
        m.set(HealthCheck, Restart, Medium);
        m.set(HealthCheck, Stop, Medium);
        m.set(HealthCheck, Deploy, Medium);

        m.set(Read, ConfigUpdate, Low);
        m.set(Read, Scale, Low);
        m.set(Read, Deploy, Low);
        m.set(Read, Restart, Low);
        m.set(Read, Stop, Low);
        m.set(HealthCheck, ConfigUpdate, Low);

        m.set(Read, Read, None);
        m.set(Read, HealthCheck, None);
        m.set(HealthCheck, HealthCheck, None);

        m
    }

    /// Register `(a, b) -> severity` and `(b, a) -> severity`.
    pub fn set(&mut self, a: OperationKind, b: OperationKind, severity: ConflictSeverity) {
        self.entries.insert((a, b), severity);
        self.entries.insert((b, a), severity);
    }

    /// Builder-style variant of [`ConflictMatrix::set`].
    #[must_use]
    pub fn with(mut self, a: OperationKind, b: OperationKind, severity: ConflictSeverity) -> Self {
        self.set(a, b, severity);
        self
    }

    /// Severity of running `a` and `b` concurrently on one resource.
    pub fn severity(&self, a: OperationKind, b: OperationKind) -> ConflictSeverity {
        self.entries.get(&(a, b)).copied().unwrap_or_default()
    }

    /// Number of ordered pairs stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pair has been seeded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a conflict came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictSource {
    /// An active hold on the target resource itself.
    Direct,
    /// A disruptive hold on a resource the target depends on.
    Dependency {
        /// The dependency that is being stopped or restarted.
        resource_id: String,
    },
}

/// One entry of a request's conflict set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// The active operation the request collides with.
    pub operation_id: OperationId,
    /// Kind of that operation.
    pub kind: OperationKind,
    /// Agent holding that operation.
    pub agent_id: String,
    /// Resolved severity.
    pub severity: ConflictSeverity,
    /// Direct or via a dependency edge.
    pub source: ConflictSource,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConflictSource::Direct => write!(
                f,
                "{} ({}) held by {} [{}]",
                self.kind, self.operation_id, self.agent_id, self.severity
            ),
            ConflictSource::Dependency { resource_id } => write!(
                f,
                "dependency {resource_id} under {} ({}) held by {} [{}]",
                self.kind, self.operation_id, self.agent_id, self.severity
            ),
        }
    }
}

/// Highest severity in a conflict set, `None` when empty.
pub fn max_severity(conflicts: &[Conflict]) -> ConflictSeverity {
    conflicts
        .iter()
        .map(|c| c.severity)
        .max()
        .unwrap_or_default()
}

/// Interface a host orchestrator uses to ask about conflicts.
///
/// Wire an implementation (normally the `Coordinator`) in at construction
/// time; the orchestrator never needs the concrete scheduler type.
pub trait ConflictDetector: Send + Sync {
    /// Conflicts an operation of `kind` on `resource_id` would face right now.
    fn detect_conflicts(&self, resource_id: &str, kind: OperationKind) -> Vec<Conflict>;

    /// Whether any operation currently holds `resource_id`.
    fn is_resource_locked(&self, resource_id: &str) -> bool;
}
