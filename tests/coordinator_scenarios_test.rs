//! End-to-end scheduling scenarios against the public coordinator API.

use std::sync::Arc;
use std::time::Duration;

use prometheus_coordinator::builders::CoordinatorBuilder;
use prometheus_coordinator::config::CoordinatorConfig;
use prometheus_coordinator::core::{
    AuditAction, ChannelAuditSink, ConflictSeverity, ConflictSource, Coordinator, OperationKind,
    OperationRequest, OperationStatus, RejectReason, ResourceSpec, TIMEOUT_ERROR,
};
use prometheus_coordinator::util::clock::ManualClock;

fn coordinator_with_clock(config: CoordinatorConfig) -> (Coordinator, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let coordinator = CoordinatorBuilder::new(config)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("valid config");
    (coordinator, clock)
}

fn coordinator() -> Coordinator {
    coordinator_with_clock(CoordinatorConfig::default()).0
}

#[test]
fn second_restart_is_rejected_as_critical() {
    let c = coordinator();
    assert!(c.register_resource("api", vec![8080], vec![]));

    let first = c.request_operation(OperationRequest::new("api", OperationKind::Restart, "X"));
    assert!(first.is_started());
    assert!(first.conflicts().is_empty());

    let second = c.request_operation(OperationRequest::new("api", OperationKind::Restart, "Y"));
    assert!(!second.accepted());
    assert_eq!(second.reject_reason(), Some(RejectReason::CriticalConflict));
    assert!(second.message().starts_with("Critical conflicts detected"));
    assert_eq!(second.conflicts()[0].operation_id, first.operation_id());
    assert_eq!(c.resource_locks("api").len(), 1);
}

#[test]
fn stopping_a_dependency_holds_back_dependents() {
    let c = coordinator();
    c.register_resource("api", vec![8080], vec![]);
    c.register(ResourceSpec::new("webui").depends_on("api").with_ports([3000]));

    let stop = c.request_operation(OperationRequest::new("api", OperationKind::Stop, "X"));
    assert!(stop.is_started());

    for kind in OperationKind::ALL {
        let outcome = c.request_operation(OperationRequest::new("webui", kind, "Y"));
        assert!(!outcome.is_started(), "{kind} on webui must not start");
        let conflict = &outcome.conflicts()[0];
        assert_eq!(conflict.severity, ConflictSeverity::High);
        assert_eq!(
            conflict.source,
            ConflictSource::Dependency {
                resource_id: "api".into()
            }
        );
    }

    // Once the stop finishes every queued dependent operation is re-evaluated.
    assert!(c.complete_operation(stop.operation_id(), true, None));
    assert!(c.is_resource_locked("webui"));
}

#[test]
fn dependents_do_not_block_their_dependency() {
    let c = coordinator();
    c.register(ResourceSpec::new("webui").depends_on("api"));
    c.request_operation(OperationRequest::new("webui", OperationKind::Restart, "X"));

    let outcome = c.request_operation(OperationRequest::new("api", OperationKind::Stop, "Y"));
    assert!(outcome.is_started());
}

#[test]
fn concurrent_config_updates_start_with_a_warning() {
    let c = coordinator();
    c.request_operation(OperationRequest::new("X", OperationKind::ConfigUpdate, "a"));
    let second = c.request_operation(OperationRequest::new("X", OperationKind::ConfigUpdate, "b"));

    assert!(second.is_started());
    assert!(second.message().contains("warning"));
    assert!(second.message().contains("1 minor conflict"));
    assert_eq!(second.conflicts().len(), 1);
    assert_eq!(second.conflicts()[0].severity, ConflictSeverity::Medium);
    assert_eq!(c.active_operations().len(), 2);
}

#[test]
fn drain_promotes_by_priority() {
    let c = coordinator();
    let hold = c.request_operation(OperationRequest::new("api", OperationKind::Restart, "ops"));

    let mut ids = Vec::new();
    for priority in [3, 9, 5] {
        let outcome = c.request_operation(
            OperationRequest::new("api", OperationKind::ConfigUpdate, format!("agent-{priority}"))
                .with_priority(priority),
        );
        assert!(outcome.is_queued());
        ids.push((priority, outcome.operation_id()));
    }
    let queued: Vec<i32> = c.queued_operations().iter().map(|op| op.priority).collect();
    assert_eq!(queued, vec![9, 5, 3]);

    assert!(c.complete_operation(hold.operation_id(), true, None));
    assert!(c.queued_operations().is_empty());

    let promoted: Vec<i32> = c
        .history(Some(3))
        .iter()
        .map(|record| record.operation.priority)
        .collect();
    assert_eq!(promoted, vec![9, 5, 3]);
    for (_, id) in ids {
        assert_eq!(c.operation(id).unwrap().status, OperationStatus::Active);
    }
}

#[test]
fn manual_drain_waits_for_blockers_to_clear() {
    let c = coordinator();
    let hold = c.request_operation(OperationRequest::new("api", OperationKind::Stop, "ops"));
    let low = c.request_operation(
        OperationRequest::new("api", OperationKind::ConfigUpdate, "a").with_priority(1),
    );
    let high = c.request_operation(
        OperationRequest::new("api", OperationKind::ConfigUpdate, "b").with_priority(7),
    );

    assert!(c.drain_queue().is_empty());
    assert!(c.force_unlock("api", ""));
    assert_eq!(
        c.operation(hold.operation_id()).unwrap().error.as_deref(),
        Some("force unlock")
    );
    assert!(c.drain_queue().is_empty());
    assert_eq!(
        c.active_operations()
            .iter()
            .map(|op| op.id)
            .collect::<Vec<_>>(),
        vec![low.operation_id(), high.operation_id()]
    );
}

#[test]
fn expired_operations_fail_with_timeout() {
    let config = CoordinatorConfig {
        operation_timeout_seconds: 1,
        ..CoordinatorConfig::default()
    };
    let (c, clock) = coordinator_with_clock(config);
    let outcome = c.request_operation(OperationRequest::new("api", OperationKind::Deploy, "ci"));
    clock.advance(Duration::from_millis(1_100));

    assert_eq!(c.cleanup_expired_operations(None), 1);
    let op = c.operation(outcome.operation_id()).unwrap();
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(!c.is_resource_locked("api"));
    assert!(!c.complete_operation(outcome.operation_id(), true, None));
}

#[test]
fn force_unlock_cancels_holds_and_reevaluates_queue() {
    let c = coordinator();
    let a = c.request_operation(OperationRequest::new("api", OperationKind::ConfigUpdate, "a"));
    let b = c.request_operation(OperationRequest::new("api", OperationKind::ConfigUpdate, "b"));
    let waiting = c.request_operation(OperationRequest::new("api", OperationKind::Restart, "c"));
    assert!(a.is_started() && b.is_started());
    assert!(waiting.is_queued());

    assert!(c.force_unlock("api", "emergency"));

    for id in [a.operation_id(), b.operation_id()] {
        let op = c.operation(id).unwrap();
        assert_eq!(op.status, OperationStatus::ForceCancelled);
        assert_eq!(op.error.as_deref(), Some("emergency"));
    }
    assert_eq!(
        c.operation(waiting.operation_id()).unwrap().status,
        OperationStatus::Active
    );
    assert_eq!(c.resource_locks("api").len(), 1);

    assert!(c.force_unlock("api", "emergency"));
    assert!(!c.is_resource_locked("api"));
    assert!(!c.force_unlock("api", "nothing left"));
}

#[test]
fn full_queue_rejects_with_reason() {
    let config = CoordinatorConfig {
        queue_max_size: 2,
        ..CoordinatorConfig::default()
    };
    let (c, _) = coordinator_with_clock(config);
    c.request_operation(OperationRequest::new("api", OperationKind::Deploy, "ci"));
    assert!(c.request_operation(OperationRequest::new("api", OperationKind::Scale, "a")).is_queued());
    assert!(c.request_operation(OperationRequest::new("api", OperationKind::Scale, "b")).is_queued());

    let third = c.request_operation(OperationRequest::new("api", OperationKind::Scale, "c"));
    assert_eq!(third.reject_reason(), Some(RejectReason::QueueFull));
    assert!(third.message().contains("Queue full"));
    assert_eq!(
        c.operation(third.operation_id()).unwrap().status,
        OperationStatus::Rejected
    );
}

#[test]
fn completing_unknown_or_queued_operations_is_refused() {
    let c = coordinator();
    c.request_operation(OperationRequest::new("api", OperationKind::Stop, "a"));
    let queued = c.request_operation(OperationRequest::new("api", OperationKind::Scale, "b"));

    assert!(!c.complete_operation(queued.operation_id(), true, None));
    assert!(!c.complete_operation(prometheus_coordinator::core::OperationId::new(), true, None));
    assert_eq!(c.queued_operations().len(), 1);
}

#[test]
fn conservation_on_completion() {
    let c = coordinator();
    let a = c.request_operation(OperationRequest::new("api", OperationKind::Read, "a"));
    c.request_operation(OperationRequest::new("api", OperationKind::Read, "b"));
    let before = c.get_system_status().resources["api"].active_operations;

    c.complete_operation(a.operation_id(), true, None);
    let after = c.get_system_status().resources["api"].active_operations;
    assert_eq!(after, before - 1);
}

#[test]
fn audit_channel_sees_every_decision() {
    let (sink, rx) = ChannelAuditSink::bounded(64);
    let c = CoordinatorBuilder::new(CoordinatorConfig::default())
        .with_audit(Box::new(sink))
        .build()
        .unwrap();

    let restart = c.request_operation(OperationRequest::new("api", OperationKind::Restart, "a"));
    c.request_operation(OperationRequest::new("api", OperationKind::Stop, "b"));
    c.request_operation(OperationRequest::new("api", OperationKind::Scale, "c"));
    c.complete_operation(restart.operation_id(), false, Some("exit 137".into()));

    let actions: Vec<AuditAction> = rx.try_iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Start,
            AuditAction::Reject,
            AuditAction::Enqueue,
            AuditAction::Fail,
            AuditAction::Promote,
        ]
    );
}
