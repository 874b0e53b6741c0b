//! Infrastructure adapters for the wait queue.

pub mod queue;

pub use queue::InMemoryQueue;
