//! Configuration models for the coordinator and its reaper.

pub mod coordinator;

pub use coordinator::CoordinatorConfig;
