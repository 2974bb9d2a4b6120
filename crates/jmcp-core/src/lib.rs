//! Shared data model and error taxonomy for the Jenkins MCP server.

pub mod error;
pub mod models;
pub mod params;
pub mod types;

pub use error::{AppError, UpstreamError, UpstreamErrorKind};
pub use params::normalize_params;
pub use types::{
    BatchOperation, CacheTier, DEFAULT_PRIORITY, JobTask, MAX_PRIORITY, MIN_PRIORITY,
    OperationStatus, RemoteCancel, RetryPolicy, TaskCounts, TaskResult, TaskState, TierPolicy,
    validate_job_name,
};
