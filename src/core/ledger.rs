//! Allocation ledger: per-resource holds and the append-only history.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::{CoordinatorError, Operation, OperationId, OperationStatus};

/// Kind of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventKind {
    /// The operation acquired its hold.
    Started,
    /// The operation released its hold on its own (success or failure).
    Finished,
    /// The hold was cleared administratively.
    ForceCancelled,
}

/// One entry of the ledger history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// What happened.
    pub event: HistoryEventKind,
    /// Snapshot of the operation at that moment.
    pub operation: Operation,
    /// When it happened, milliseconds since epoch.
    pub timestamp_ms: u128,
    /// Time the hold was kept, for release records.
    pub duration_ms: Option<u128>,
    /// Outcome, for release records.
    pub success: Option<bool>,
}

/// Active holds per resource plus the history of every acquire and release.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    holds: HashMap<String, BTreeSet<OperationId>>,
    active: HashMap<OperationId, Operation>,
    history: Vec<HistoryRecord>,
}

impl AllocationLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `operation` a hold on its resource and mark it `active`.
    pub fn acquire(&mut self, mut operation: Operation, now_ms: u128) -> Result<(), CoordinatorError> {
        if self.active.contains_key(&operation.id) {
            return Err(CoordinatorError::DuplicateOperation(operation.id));
        }
        operation.status = OperationStatus::Active;
        operation.started_at_ms = Some(now_ms);

        self.holds
            .entry(operation.resource_id.clone())
            .or_default()
            .insert(operation.id);
        self.history.push(HistoryRecord {
            event: HistoryEventKind::Started,
            operation: operation.clone(),
            timestamp_ms: now_ms,
            duration_ms: None,
            success: None,
        });
        tracing::debug!(
            operation = %operation.id,
            resource = %operation.resource_id,
            kind = %operation.kind,
            "hold acquired"
        );
        self.active.insert(operation.id, operation);
        Ok(())
    }

    /// Release the hold of `id`, recording the outcome. Returns the finished
    /// operation, or `None` if `id` holds nothing.
    pub fn release(
        &mut self,
        id: OperationId,
        success: bool,
        error: Option<String>,
        now_ms: u128,
    ) -> Option<Operation> {
        let mut operation = self.active.remove(&id)?;
        self.remove_hold(&operation.resource_id, id);

        operation.status = if success {
            OperationStatus::Completed
        } else {
            OperationStatus::Failed
        };
        operation.error = error.filter(|e| !e.is_empty());
        operation.finished_at_ms = Some(now_ms);

        self.history.push(HistoryRecord {
            event: HistoryEventKind::Finished,
            duration_ms: operation.held_ms(now_ms),
            operation: operation.clone(),
            timestamp_ms: now_ms,
            success: Some(success),
        });
        Some(operation)
    }

    /// Clear every hold on `resource_id` without any conflict check. Each
    /// cleared operation ends `force_cancelled` with `reason`.
    pub fn force_release(&mut self, resource_id: &str, reason: &str, now_ms: u128) -> Vec<Operation> {
        let Some(ids) = self.holds.remove(resource_id) else {
            return Vec::new();
        };

        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut operation) = self.active.remove(&id) else {
                tracing::error!(operation = %id, resource = %resource_id, "hold without active operation");
                continue;
            };
            operation.status = OperationStatus::ForceCancelled;
            operation.error = Some(reason.to_string());
            operation.finished_at_ms = Some(now_ms);
            self.history.push(HistoryRecord {
                event: HistoryEventKind::ForceCancelled,
                duration_ms: operation.held_ms(now_ms),
                operation: operation.clone(),
                timestamp_ms: now_ms,
                success: Some(false),
            });
            cancelled.push(operation);
        }
        cancelled
    }

    fn remove_hold(&mut self, resource_id: &str, id: OperationId) {
        if let Some(set) = self.holds.get_mut(resource_id) {
            set.remove(&id);
            if set.is_empty() {
                self.holds.remove(resource_id);
            }
        }
    }

    /// Ids holding `resource_id`.
    pub fn holds(&self, resource_id: &str) -> BTreeSet<OperationId> {
        self.holds.get(resource_id).cloned().unwrap_or_default()
    }

    /// Every non-empty hold set.
    pub fn all_holds(&self) -> &HashMap<String, BTreeSet<OperationId>> {
        &self.holds
    }

    /// Active operations on `resource_id`.
    pub fn active_on<'a>(&'a self, resource_id: &str) -> impl Iterator<Item = &'a Operation> + 'a {
        self.holds
            .get(resource_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.active.get(id))
    }

    /// Every active operation, unordered.
    pub fn active(&self) -> impl Iterator<Item = &Operation> {
        self.active.values()
    }

    /// Active operation by id.
    pub fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.active.get(id)
    }

    /// Whether anything holds `resource_id`.
    pub fn is_locked(&self, resource_id: &str) -> bool {
        self.holds.get(resource_id).is_some_and(|s| !s.is_empty())
    }

    /// Number of active operations.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// History, oldest first.
    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Latest terminal snapshot of `id` in the history.
    pub fn finished(&self, id: &OperationId) -> Option<&Operation> {
        self.history
            .iter()
            .rev()
            .find(|r| r.operation.id == *id && r.event != HistoryEventKind::Started)
            .map(|r| &r.operation)
    }
}
