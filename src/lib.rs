//! # Prometheus Coordinator
//!
//! A conflict-aware operation scheduler for managed resources: containers,
//! GPUs, model servers, or any named unit that several agents may want to act
//! on at once.
//!
//! Agents ask the [`core::Coordinator`] for permission before they restart,
//! deploy, scale, or read a resource. The coordinator looks up every active
//! hold on that resource (and on the resources it depends on) in a
//! [`core::ConflictMatrix`] and decides:
//!
//! - **none / low / medium**: start now, reporting minor conflicts as warnings;
//! - **high**: park the request in a priority queue until the conflict clears;
//! - **critical**: reject, so the caller retries later.
//!
//! Completion releases the hold and promotes whatever queued work no longer
//! conflicts. A timeout reaper fails holds that were never released, and can
//! optionally restart resources stuck in `error`.
//!
//! ## Key Features
//!
//! - **Severity-graded conflicts**: a symmetric, replaceable matrix over eight
//!   operation kinds
//! - **Dependency awareness**: stopping or restarting a resource blocks
//!   disruptive work on its dependents
//! - **Priority queue**: higher priority first, FIFO within a band
//! - **Audit trail**: every decision emitted to a pluggable [`core::AuditSink`]
//! - **Introspection**: serde-serializable status snapshots
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_coordinator::builders::CoordinatorBuilder;
//! use prometheus_coordinator::config::CoordinatorConfig;
//! use prometheus_coordinator::core::{OperationKind, OperationRequest};
//!
//! let coordinator = CoordinatorBuilder::new(CoordinatorConfig::default()).build()?;
//! coordinator.register_resource("api", vec![8080], vec!["db".into()]);
//!
//! let outcome = coordinator.request_operation(
//!     OperationRequest::new("api", OperationKind::Restart, "ops-agent"),
//! );
//! if outcome.is_started() {
//!     // ... perform the restart ...
//!     coordinator.complete_operation(outcome.operation_id(), true, None);
//! }
//! ```
//!
//! For complete scenarios, see `tests/coordinator_scenarios_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: registry, conflict matrix, ledger, and coordinator.
pub mod core;
/// Configuration models.
pub mod config;
/// Builders to construct coordinator components from configuration.
pub mod builders;
/// Infrastructure adapters for queue backends.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
