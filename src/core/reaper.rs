//! Timeout reaper and auto-recovery sweep.
//!
//! `Coordinator::cleanup_expired_operations` is the synchronous, on-demand
//! sweep. [`TimeoutReaper`] wraps it in a background loop on any runtime that
//! implements [`Spawn`], and optionally restarts resources stuck in `error`
//! through a host-provided [`RecoveryHandler`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{
    AppResult, AuditAction, ConflictDetector, ConflictSeverity, Coordinator, ManagedResource,
    OperationId, OperationKind, OperationRequest, RequestOutcome, ResourceState,
};
use crate::core::conflict::max_severity;

/// Error message attached to operations failed by the reaper.
pub const TIMEOUT_ERROR: &str = "Operation timeout";
/// Agent id used for auto-recovery restarts.
pub const AUTO_RECOVERY_AGENT: &str = "auto-recovery";
/// Priority of auto-recovery restarts.
pub const AUTO_RECOVERY_PRIORITY: i32 = 8;

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Host hook that performs the actual recovery work for a failed resource.
///
/// Called outside the coordinator lock while the resource is held by a
/// `restart` operation on behalf of [`AUTO_RECOVERY_AGENT`].
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    /// Bring `resource` back. An `Err` fails the restart operation.
    async fn recover(&self, resource: ManagedResource) -> AppResult<()>;
}

impl Coordinator {
    /// Fail every active operation older than `timeout` (default:
    /// `operation_timeout_seconds`) with [`TIMEOUT_ERROR`], then drain the
    /// queue. Returns how many operations were reaped.
    pub fn cleanup_expired_operations(&self, timeout: Option<Duration>) -> usize {
        let timeout_ms = timeout
            .unwrap_or_else(|| self.config().operation_timeout())
            .as_millis();
        let now = self.now_ms();
        let mut state = self.state.lock();

        let expired: Vec<OperationId> = state
            .ledger
            .active()
            .filter(|op| op.age_ms(now) > timeout_ms)
            .map(|op| op.id)
            .collect();

        let mut reaped = 0;
        for id in expired {
            if self.release(
                &mut state,
                id,
                false,
                Some(TIMEOUT_ERROR.to_string()),
                AuditAction::Expire,
                now,
            ) {
                tracing::warn!(operation = %id, timeout_ms = %timeout_ms, "operation timed out");
                reaped += 1;
            }
        }
        if reaped > 0 {
            self.drain(&mut state, now);
        }
        reaped
    }
}

/// Totals of one reaper sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Operations failed for exceeding the timeout.
    pub expired: usize,
    /// Resources restarted successfully.
    pub recovered: usize,
    /// Recovery attempts that failed.
    pub recovery_failures: usize,
}

/// Periodic sweep over a shared coordinator.
#[derive(Clone)]
pub struct TimeoutReaper {
    coordinator: Arc<Coordinator>,
    interval: Duration,
    timeout: Option<Duration>,
    recovery: Option<Arc<dyn RecoveryHandler>>,
}

impl TimeoutReaper {
    /// Reaper using the coordinator's configured interval and timeout.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let interval = coordinator.config().reaper_interval();
        Self {
            coordinator,
            interval,
            timeout: None,
            recovery: None,
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach the recovery hook used when `enable_auto_recovery` is set.
    #[must_use]
    pub fn with_recovery_handler(mut self, handler: Arc<dyn RecoveryHandler>) -> Self {
        self.recovery = Some(handler);
        self
    }

    /// Sweep interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep: reap expired operations, then attempt auto-recovery.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport {
            expired: self.coordinator.cleanup_expired_operations(self.timeout),
            ..SweepReport::default()
        };

        if self.coordinator.config().enable_auto_recovery {
            if let Some(handler) = &self.recovery {
                self.recover_errored(handler.as_ref(), &mut report).await;
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                expired = report.expired,
                recovered = report.recovered,
                recovery_failures = report.recovery_failures,
                "reaper sweep finished"
            );
        }
        report
    }

    async fn recover_errored(&self, handler: &dyn RecoveryHandler, report: &mut SweepReport) {
        let coordinator = &self.coordinator;
        for resource_id in coordinator.resources_in_state(ResourceState::Error) {
            let blocking = max_severity(
                &coordinator.detect_conflicts(&resource_id, OperationKind::Restart),
            );
            if blocking >= ConflictSeverity::High {
                tracing::debug!(resource = %resource_id, "recovery deferred, resource busy");
                continue;
            }

            let request = OperationRequest::new(&resource_id, OperationKind::Restart, AUTO_RECOVERY_AGENT)
                .with_priority(AUTO_RECOVERY_PRIORITY)
                .with_description("automatic recovery from error state");
            let operation_id = match coordinator.request_operation(request) {
                RequestOutcome::Started { operation_id, .. } => operation_id,
                RequestOutcome::Queued { operation_id, .. } => {
                    tracing::warn!(
                        operation = %operation_id,
                        resource = %resource_id,
                        "recovery restart queued; it will be reaped if never completed"
                    );
                    continue;
                }
                RequestOutcome::Rejected { message, .. } => {
                    tracing::debug!(resource = %resource_id, %message, "recovery restart rejected");
                    continue;
                }
            };

            let Some(resource) = coordinator.resource(&resource_id) else {
                coordinator.complete_operation(operation_id, false, Some("resource vanished".into()));
                continue;
            };
            coordinator.update_resource_state(&resource_id, ResourceState::Starting, "recovering");

            match handler.recover(resource).await {
                Ok(()) => {
                    coordinator.update_resource_state(&resource_id, ResourceState::Running, "recovered");
                    coordinator.complete_operation(operation_id, true, None);
                    tracing::info!(resource = %resource_id, "resource recovered");
                    report.recovered += 1;
                }
                Err(err) => {
                    let message = format!("recovery failed: {err:#}");
                    coordinator.update_resource_state(&resource_id, ResourceState::Error, message.clone());
                    coordinator.complete_operation(operation_id, false, Some(message));
                    tracing::error!(resource = %resource_id, error = %err, "resource recovery failed");
                    report.recovery_failures += 1;
                }
            }
        }
    }
}

#[cfg(feature = "tokio-runtime")]
mod background {
    use super::{Spawn, TimeoutReaper};
    use tokio::sync::watch;

    /// Handle to a running background reaper. Dropping it stops the loop.
    pub struct ReaperHandle {
        shutdown: watch::Sender<bool>,
    }

    impl ReaperHandle {
        /// Stop the background loop after its current sweep.
        pub fn shutdown(self) {
            let _ = self.shutdown.send(true);
        }
    }

    impl TimeoutReaper {
        /// Start sweeping every `interval` on `spawner`.
        pub fn spawn<S: Spawn>(self, spawner: &S) -> ReaperHandle {
            let (tx, mut rx) = watch::channel(false);
            let interval = self.interval;
            spawner.spawn(async move {
                tracing::info!(interval_ms = %interval.as_millis(), "timeout reaper started");
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(interval) => {
                            self.sweep().await;
                        }
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                    }
                }
                tracing::info!("timeout reaper stopped");
            });
            ReaperHandle { shutdown: tx }
        }
    }
}

#[cfg(feature = "tokio-runtime")]
pub use background::ReaperHandle;
