use serde::Deserialize;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use jmcp_batch::BatchOptions;
use jmcp_core::{AppError, BatchOperation, DEFAULT_PRIORITY, JobTask};

use super::{ToolResult, parse_args, to_json};
use crate::app::App;

const REMOTE_CANCEL_NOTE: &str = "Remote cancellation is best effort and only applies to \
triggers still running when the cancel arrives; builds of tasks that had already succeeded are \
left alone and may keep running. Check remote_cancel on each result.";

#[derive(Deserialize)]
struct TaskArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default = "default_priority")]
    priority: u8,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl From<TaskArgs> for JobTask {
    fn from(args: TaskArgs) -> Self {
        Self {
            job_name: args.job_name,
            params: args.params,
            priority: args.priority,
        }
    }
}

#[derive(Deserialize)]
struct TriggerArgs {
    operations: Vec<TaskArgs>,
    #[serde(default, alias = "maxConcurrent")]
    max_concurrent: Option<usize>,
    #[serde(default, alias = "failFast")]
    fail_fast: bool,
    #[serde(default, alias = "waitForCompletion")]
    wait_for_completion: bool,
}

#[derive(Deserialize)]
struct MonitorArgs {
    #[serde(alias = "operationId")]
    operation_id: String,
}

#[derive(Deserialize)]
struct CancelArgs {
    #[serde(alias = "operationId")]
    operation_id: String,
    #[serde(default, alias = "cancelRunningBuilds")]
    cancel_running_builds: bool,
}

fn parse_operation_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::validation(format!("operation_id '{raw}' is not a valid UUID")))
}

/// Operation snapshot with its per-state counts.
fn operation_view(operation: &BatchOperation) -> ToolResult {
    let mut view = to_json(operation)?;
    view["counts"] = to_json(&operation.counts())?;
    Ok(view)
}

pub(super) async fn batch_trigger_jobs(app: &App, args: Value) -> ToolResult {
    let args: TriggerArgs = parse_args(args)?;
    let options = BatchOptions {
        max_concurrent: args
            .max_concurrent
            .unwrap_or(app.config.batch.default_max_concurrent),
        fail_fast: args.fail_fast,
        wait_for_completion: args.wait_for_completion,
    };
    let tasks = args.operations.into_iter().map(JobTask::from).collect();
    let operation = app.batch.trigger_batch(tasks, options).await?;
    operation_view(&operation)
}

pub(super) fn batch_monitor_jobs(app: &App, args: Value) -> ToolResult {
    let args: MonitorArgs = parse_args(args)?;
    let operation = app
        .batch
        .monitor_batch(parse_operation_id(&args.operation_id)?)?;
    operation_view(&operation)
}

pub(super) async fn batch_cancel_jobs(app: &App, args: Value) -> ToolResult {
    let args: CancelArgs = parse_args(args)?;
    let operation_id = parse_operation_id(&args.operation_id)?;
    let operation = app
        .batch
        .cancel_batch(operation_id, args.cancel_running_builds)
        .await?;
    let mut view = operation_view(&operation)?;
    view["note"] = json!(REMOTE_CANCEL_NOTE);
    Ok(view)
}

pub(super) fn batch_list_operations(app: &App) -> ToolResult {
    let operations = app.batch.list_operations();
    Ok(json!({
        "count": operations.len(),
        "operations": to_json(&operations)?,
    }))
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
