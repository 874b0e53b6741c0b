//! Randomized checks of the scheduling invariants.

use std::sync::Arc;
use std::time::Duration;

use prometheus_coordinator::builders::CoordinatorBuilder;
use prometheus_coordinator::config::CoordinatorConfig;
use prometheus_coordinator::core::{
    ConflictMatrix, ConflictSeverity, Coordinator, OperationId, OperationKind, OperationRequest,
    OperationStatus, ResourceSpec,
};
use prometheus_coordinator::util::clock::ManualClock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const RESOURCES: [&str; 3] = ["db", "api", "webui"];

fn build(clock: &ManualClock, queue_max_size: usize) -> Coordinator {
    let config = CoordinatorConfig {
        queue_max_size,
        operation_timeout_seconds: 30,
        ..CoordinatorConfig::default()
    };
    let c = CoordinatorBuilder::new(config)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    c.register(ResourceSpec::new("db"));
    c.register(ResourceSpec::new("api").depends_on("db"));
    c.register(ResourceSpec::new("webui").depends_on("api"));
    c
}

fn assert_no_double_critical(c: &Coordinator) {
    let matrix = c.matrix();
    let active = c.active_operations();
    for resource in RESOURCES {
        let on_resource: Vec<_> = active.iter().filter(|op| op.resource_id == resource).collect();
        for (i, a) in on_resource.iter().enumerate() {
            for b in &on_resource[i + 1..] {
                assert_ne!(
                    matrix.severity(a.kind, b.kind),
                    ConflictSeverity::Critical,
                    "{} and {} both active on {resource}",
                    a.kind,
                    b.kind
                );
            }
        }
        assert_eq!(c.resource_locks(resource).len(), on_resource.len());
    }
}

fn assert_queue_ordered(c: &Coordinator) {
    let queued = c.queued_operations();
    for pair in queued.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.priority >= b.priority);
        if a.priority == b.priority {
            assert!((a.created_at_ms, a.sequence) < (b.created_at_ms, b.sequence));
        }
        assert_eq!(a.status, OperationStatus::Queued);
    }
}

#[test]
fn standard_matrix_is_symmetric() {
    let matrix = ConflictMatrix::standard();
    for a in OperationKind::ALL {
        for b in OperationKind::ALL {
            assert_eq!(matrix.severity(a, b), matrix.severity(b, a), "{a}/{b}");
        }
    }
}

#[test]
fn random_workload_keeps_invariants() {
    for seed in 0..16_u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let clock = ManualClock::new(0);
        let c = build(&clock, 8);
        let mut started: Vec<OperationId> = Vec::new();

        for _ in 0..300 {
            match rng.random_range(0..10) {
                0..=5 => {
                    let resource = RESOURCES[rng.random_range(0..RESOURCES.len())];
                    let kind = OperationKind::ALL[rng.random_range(0..OperationKind::ALL.len())];
                    let request = OperationRequest::new(resource, kind, "fuzz")
                        .with_priority(rng.random_range(0..10));
                    let outcome = c.request_operation(request);
                    if outcome.accepted() {
                        started.push(outcome.operation_id());
                    }
                }
                6 | 7 => {
                    if !started.is_empty() {
                        let id = started.swap_remove(rng.random_range(0..started.len()));
                        c.complete_operation(id, rng.random_bool(0.8), None);
                    }
                }
                8 => {
                    clock.advance(Duration::from_secs(rng.random_range(0..20)));
                    c.cleanup_expired_operations(None);
                }
                _ => {
                    let resource = RESOURCES[rng.random_range(0..RESOURCES.len())];
                    c.force_unlock(resource, "fuzz");
                    assert!(!c.resource_locks(resource).iter().any(|id| {
                        c.operation(*id)
                            .is_some_and(|op| op.status == OperationStatus::ForceCancelled)
                    }));
                }
            }
            assert_no_double_critical(&c);
            assert_queue_ordered(&c);
            assert!(c.queued_operations().len() <= 8);
        }
    }
}

#[test]
fn completion_conserves_active_count() {
    let mut rng = StdRng::seed_from_u64(7);
    let clock = ManualClock::new(0);
    let c = build(&clock, 100);

    for _ in 0..200 {
        let resource = RESOURCES[rng.random_range(0..RESOURCES.len())];
        let kind = OperationKind::ALL[rng.random_range(0..OperationKind::ALL.len())];
        c.request_operation(OperationRequest::new(resource, kind, "fuzz"));

        let active = c.active_operations();
        if active.is_empty() {
            continue;
        }
        let victim = &active[rng.random_range(0..active.len())];
        let before = c.get_system_status();
        let queued_before = before.queued_count;
        let active_before = before.resources[&victim.resource_id].active_operations;

        assert!(c.complete_operation(victim.id, true, None));
        let after = c.get_system_status();
        let promoted = queued_before - after.queued_count;
        if promoted == 0 {
            assert_eq!(
                after.resources[&victim.resource_id].active_operations,
                active_before - 1
            );
        }
        assert_eq!(after.active_count, before.active_count - 1 + promoted);
    }
}

#[test]
fn force_unlock_leaves_nothing_behind() {
    let mut rng = StdRng::seed_from_u64(42);
    let clock = ManualClock::new(0);
    let c = build(&clock, 100);

    for _ in 0..100 {
        let kind = OperationKind::ALL[rng.random_range(0..OperationKind::ALL.len())];
        c.request_operation(OperationRequest::new("api", kind, "fuzz"));
    }
    // Keep unlocking until promotions stop refilling the resource.
    let mut cancelled: Vec<OperationId> = Vec::new();
    loop {
        let holding = c.resource_locks("api");
        if holding.is_empty() {
            break;
        }
        cancelled.extend(holding.iter().copied());
        assert!(c.force_unlock("api", "drain"));
        assert!(holding.iter().all(|id| !c.resource_locks("api").contains(id)));
    }

    assert!(!c.is_resource_locked("api"));
    for id in cancelled {
        assert_eq!(
            c.operation(id).unwrap().status,
            OperationStatus::ForceCancelled
        );
    }
}
