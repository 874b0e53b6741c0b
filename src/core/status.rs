//! Read-only projections over the ledger, queue, and registry.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::{Coordinator, HistoryEventKind, HistoryRecord, Operation, OperationId, ResourceState};

/// Window used for [`SystemStatus::recent_ops_count`].
pub const RECENT_WINDOW_MS: u128 = 24 * 60 * 60 * 1000;

/// Per-resource view inside [`SystemStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Lifecycle state.
    pub state: ResourceState,
    /// Health tag.
    pub health: String,
    /// Holds on the resource.
    pub lock_count: usize,
    /// Active operations targeting the resource.
    pub active_operations: usize,
    /// Queued operations targeting the resource.
    pub queued_operations: usize,
    /// Resources this one depends on.
    pub dependencies: BTreeSet<String>,
    /// Last state change.
    pub updated_at_ms: u128,
}

/// Aggregate snapshot for dashboards and orchestrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Every registered resource, by id.
    pub resources: BTreeMap<String, ResourceStatus>,
    /// Active operations across all resources.
    pub active_count: usize,
    /// Operations waiting in the queue.
    pub queued_count: usize,
    /// Operations started in the last 24 hours.
    pub recent_ops_count: usize,
    /// When the snapshot was taken.
    pub generated_at_ms: u128,
}

impl Coordinator {
    /// Active operations, oldest first.
    pub fn active_operations(&self) -> Vec<Operation> {
        let state = self.state.lock();
        let mut ops: Vec<Operation> = state.ledger.active().cloned().collect();
        ops.sort_by_key(|op| (op.created_at_ms, op.sequence));
        ops
    }

    /// Queued operations in scheduling order.
    pub fn queued_operations(&self) -> Vec<Operation> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Ids holding `resource_id`.
    pub fn resource_locks(&self, resource_id: &str) -> BTreeSet<OperationId> {
        self.state.lock().ledger.holds(resource_id)
    }

    /// Every non-empty hold set, by resource.
    pub fn all_locks(&self) -> BTreeMap<String, BTreeSet<OperationId>> {
        self.state
            .lock()
            .ledger
            .all_holds()
            .iter()
            .map(|(resource, ids)| (resource.clone(), ids.clone()))
            .collect()
    }

    /// Latest known snapshot of an operation: active, queued, or finished.
    pub fn operation(&self, id: OperationId) -> Option<Operation> {
        let state = self.state.lock();
        state
            .ledger
            .get(&id)
            .or_else(|| state.queue.get(&id))
            .or_else(|| state.ledger.finished(&id))
            .or_else(|| state.archive.get(&id))
            .cloned()
    }

    /// Ledger history, oldest first, optionally limited to the last `limit`
    /// records.
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryRecord> {
        let state = self.state.lock();
        let history = state.ledger.history();
        let skip = limit.map_or(0, |n| history.len().saturating_sub(n));
        history[skip..].to_vec()
    }

    /// Aggregate status of every resource plus totals.
    pub fn get_system_status(&self) -> SystemStatus {
        let now = self.now_ms();
        let state = self.state.lock();

        let mut queued_per_resource: BTreeMap<&str, usize> = BTreeMap::new();
        for op in state.queue.iter() {
            *queued_per_resource.entry(op.resource_id.as_str()).or_default() += 1;
        }

        let resources = state
            .registry
            .iter()
            .map(|resource| {
                let lock_count = state.ledger.holds(&resource.id).len();
                let status = ResourceStatus {
                    state: resource.state,
                    health: resource.health.clone(),
                    lock_count,
                    active_operations: state.ledger.active_on(&resource.id).count(),
                    queued_operations: queued_per_resource
                        .get(resource.id.as_str())
                        .copied()
                        .unwrap_or(0),
                    dependencies: resource.dependencies.clone(),
                    updated_at_ms: resource.updated_at_ms,
                };
                (resource.id.clone(), status)
            })
            .collect();

        let cutoff = now.saturating_sub(RECENT_WINDOW_MS);
        let recent_ops_count = state
            .ledger
            .history()
            .iter()
            .filter(|r| r.event == HistoryEventKind::Started && r.timestamp_ms >= cutoff)
            .count();

        SystemStatus {
            resources,
            active_count: state.ledger.active_count(),
            queued_count: state.queue.len(),
            recent_ops_count,
            generated_at_ms: now,
        }
    }
}
