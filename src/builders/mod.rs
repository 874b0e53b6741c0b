//! Builders to construct coordinator components from configuration.

pub mod coordinator_builder;

pub use coordinator_builder::CoordinatorBuilder;
