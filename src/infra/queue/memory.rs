//! In-memory queue with priority ordering and FIFO within a priority band.

use crate::core::queue::{queue_key, OperationQueue};
use crate::core::{CoordinatorError, Operation, OperationId};

/// In-memory queue storing operations in a sorted vector.
///
/// Insertion is a binary search plus shift, which is fine for the small,
/// bounded depths the coordinator works with, and it lets the drain pass scan
/// in order and pull entries out of the middle.
pub struct InMemoryQueue {
    max_depth: usize,
    entries: Vec<Operation>,
}

impl InMemoryQueue {
    /// Create a new in-memory queue with a maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            entries: Vec::with_capacity(max_depth.min(1024)),
        }
    }
}

impl OperationQueue for InMemoryQueue {
    fn enqueue(&mut self, operation: Operation) -> Result<usize, CoordinatorError> {
        if self.is_full() {
            return Err(CoordinatorError::QueueFull(format!(
                "max queue depth {} reached",
                self.max_depth
            )));
        }
        let key = queue_key(&operation);
        let position = self.entries.partition_point(|e| queue_key(e) <= key);
        self.entries.insert(position, operation);
        Ok(position)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Operation> + '_> {
        Box::new(self.entries.iter())
    }

    fn remove(&mut self, id: &OperationId) -> Option<Operation> {
        let index = self.entries.iter().position(|op| op.id == *id)?;
        Some(self.entries.remove(index))
    }

    fn remove_where(&mut self, predicate: &mut dyn FnMut(&Operation) -> bool) -> Vec<Operation> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for op in self.entries.drain(..) {
            if predicate(&op) {
                removed.push(op);
            } else {
                kept.push(op);
            }
        }
        self.entries = kept;
        removed
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
