//! Wait-queue abstraction for operations parked behind a `high` conflict.

use std::cmp::Reverse;

use crate::core::{CoordinatorError, Operation, OperationId};

/// Sort key of a queued operation: higher priority first, then arrival order.
pub fn queue_key(op: &Operation) -> (Reverse<i32>, u128, u64) {
    (Reverse(op.priority), op.created_at_ms, op.sequence)
}

/// Abstraction for queue backends.
///
/// Implementations keep entries ordered by [`queue_key`] at all times.
pub trait OperationQueue: Send {
    /// Insert an operation if space permits. Returns its zero-based position.
    fn enqueue(&mut self, operation: Operation) -> Result<usize, CoordinatorError>;
    /// Entries in scheduling order.
    fn iter(&self) -> Box<dyn Iterator<Item = &Operation> + '_>;
    /// Remove one entry by id.
    fn remove(&mut self, id: &OperationId) -> Option<Operation>;
    /// Remove every entry matching `predicate`, in scheduling order.
    fn remove_where(&mut self, predicate: &mut dyn FnMut(&Operation) -> bool) -> Vec<Operation>;
    /// Maximum depth allowed for this queue.
    fn max_depth(&self) -> usize;
    /// Current depth.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether another entry would exceed [`OperationQueue::max_depth`].
    fn is_full(&self) -> bool {
        self.len() >= self.max_depth()
    }

    /// Queued entry by id.
    fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.iter().find(|op| op.id == *id)
    }
}
