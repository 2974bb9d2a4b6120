//! Batch orchestration of Jenkins job triggers.
//!
//! A batch is a list of [`JobTask`](jmcp_core::JobTask)s tracked as one
//! [`BatchOperation`](jmcp_core::BatchOperation). Operations live in memory
//! only; finished ones are dropped after the retention period.

mod handle;
mod orchestrator;
mod reaper;

pub use orchestrator::{
    BatchLimits, BatchOptions, BatchOrchestrator, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_CONCURRENT_LIMIT, DEFAULT_RETENTION, OperationSummary, TriggerHook,
};
pub use reaper::spawn_reaper;
