//! Builder that assembles a [`Coordinator`] from configuration and optional
//! component overrides.

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::core::{AuditSink, ConflictMatrix, Coordinator, CoordinatorError, OperationQueue};
use crate::infra::queue::InMemoryQueue;
use crate::util::clock::{Clock, SystemClock};

/// Coordinator builder.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    matrix: Option<ConflictMatrix>,
    clock: Option<Arc<dyn Clock>>,
    queue: Option<Box<dyn OperationQueue>>,
    audit: Option<Box<dyn AuditSink>>,
}

impl CoordinatorBuilder {
    /// Create a builder from configuration.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            matrix: None,
            clock: None,
            queue: None,
            audit: None,
        }
    }

    /// Configuration reference.
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Replace the standard conflict matrix.
    #[must_use]
    pub fn with_matrix(mut self, matrix: ConflictMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Replace the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the in-memory queue backend.
    #[must_use]
    pub fn with_queue(mut self, queue: Box<dyn OperationQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Validate the configuration and build the coordinator.
    pub fn build(self) -> Result<Coordinator, CoordinatorError> {
        self.config
            .validate()
            .map_err(|e| CoordinatorError::InvalidConfig(format!("config invalid: {e}")))?;

        let queue = self
            .queue
            .unwrap_or_else(|| Box::new(InMemoryQueue::new(self.config.queue_max_size)));
        Ok(Coordinator::from_parts(
            self.config,
            self.matrix.unwrap_or_else(ConflictMatrix::standard),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            queue,
            self.audit,
        ))
    }
}
