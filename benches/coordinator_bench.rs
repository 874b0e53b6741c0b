//! Benchmarks for the coordinator.
//!
//! Benchmarks cover:
//! - Queue insertion in priority order
//! - Request evaluation against a busy resource
//! - Completion followed by a drain pass
//! - Status snapshots

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use prometheus_coordinator::config::CoordinatorConfig;
use prometheus_coordinator::core::{
    Coordinator, Operation, OperationKind, OperationQueue, OperationRequest,
};
use prometheus_coordinator::infra::queue::memory::InMemoryQueue;

// ============================================================================
// Helper Functions
// ============================================================================

fn build_operation(i: u64) -> Operation {
    let request = OperationRequest::new(format!("resource-{}", i % 16), OperationKind::Scale, "bench")
        .with_priority((i % 10) as i32);
    Operation::from_request(request, u128::from(i), i)
}

fn coordinator(queue_max_size: usize) -> Coordinator {
    Coordinator::new(CoordinatorConfig {
        queue_max_size,
        ..CoordinatorConfig::default()
    })
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue");

    for size in [100_u64, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut q = InMemoryQueue::new(size as usize);
                for i in 0..size {
                    q.enqueue(build_operation(i)).unwrap();
                }
                black_box(q.len());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Coordinator Benchmarks
// ============================================================================

fn bench_request_against_busy_resource(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_busy_resource");

    for holders in [1_usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::from_parameter(holders),
            &holders,
            |b, &holders| {
                let coordinator = coordinator(100);
                for _ in 0..holders {
                    coordinator.request_operation(OperationRequest::new(
                        "api",
                        OperationKind::Read,
                        "reader",
                    ));
                }
                b.iter(|| {
                    // read/health_check never conflicts
                    let outcome = coordinator.request_operation(OperationRequest::new(
                        "api",
                        OperationKind::HealthCheck,
                        "probe",
                    ));
                    coordinator.complete_operation(outcome.operation_id(), true, None);
                    black_box(outcome);
                });
            },
        );
    }
    group.finish();
}

fn bench_complete_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("complete_and_drain");

    for queued in [10_usize, 100, 500] {
        group.throughput(Throughput::Elements(queued as u64));
        group.bench_with_input(BenchmarkId::from_parameter(queued), &queued, |b, &queued| {
            b.iter(|| {
                let coordinator = coordinator(queued);
                let hold = coordinator.request_operation(OperationRequest::new(
                    "api",
                    OperationKind::Restart,
                    "ops",
                ));
                for i in 0..queued {
                    coordinator.request_operation(
                        OperationRequest::new("api", OperationKind::ConfigUpdate, "agent")
                            .with_priority((i % 10) as i32),
                    );
                }
                coordinator.complete_operation(hold.operation_id(), true, None);
                black_box(coordinator.active_operations().len());
            });
        });
    }
    group.finish();
}

fn bench_system_status(c: &mut Criterion) {
    let coordinator = coordinator(1_000);
    for i in 0..200 {
        coordinator.register_resource(format!("svc-{i}"), vec![8000 + i], vec![]);
        coordinator.request_operation(OperationRequest::new(
            format!("svc-{i}"),
            OperationKind::Deploy,
            "ci",
        ));
        coordinator.request_operation(OperationRequest::new(
            format!("svc-{i}"),
            OperationKind::Scale,
            "hpa",
        ));
    }

    c.bench_function("system_status_200_resources", |b| {
        b.iter(|| black_box(coordinator.get_system_status()));
    });
}

criterion_group!(
    benches,
    bench_queue_enqueue,
    bench_request_against_busy_resource,
    bench_complete_and_drain,
    bench_system_status
);
criterion_main!(benches);
