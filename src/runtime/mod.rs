//! Runtime adapters and API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use api::{
    health, submit_operation, CompletionRequest, Health, OperationResponse, OperationSubmission,
    SubmissionStatus,
};
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
