//! MCP tool handlers. Each takes the composition root by reference and the
//! raw `arguments` object, and returns the JSON to hand back to the caller.

mod artifacts;
mod batch;
mod builds;
mod cache;
mod jobs;
mod server;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use jmcp_core::{AppError, validate_job_name};

use crate::app::App;

pub(crate) use server::health_check;

pub(crate) type ToolResult = Result<Value, AppError>;

/// Run tool `name`. Returns `None` when no such tool exists.
pub(crate) async fn call_tool(app: &App, name: &str, args: Value) -> Option<ToolResult> {
    let result = match name {
        "trigger_job" => jobs::trigger_job(app, args).await,
        "get_job_info" => jobs::get_job_info(app, args).await,
        "list_jobs" => jobs::list_jobs(app, args).await,
        "search_jobs" => jobs::search_jobs(app, args).await,
        "get_build_status" => builds::get_build_status(app, args).await,
        "get_console_log" => builds::get_console_log(app, args).await,
        "get_pipeline_status" => builds::get_pipeline_status(app, args).await,
        "summarize_build_log" => builds::summarize_build_log(app, args).await,
        "list_build_artifacts" => artifacts::list_build_artifacts(app, args).await,
        "download_build_artifact" => artifacts::download_build_artifact(app, args).await,
        "search_build_artifacts" => artifacts::search_build_artifacts(app, args).await,
        "get_queue_info" => server::get_queue_info(app).await,
        "server_info" => server::server_info(app).await,
        "batch_trigger_jobs" => batch::batch_trigger_jobs(app, args).await,
        "batch_monitor_jobs" => batch::batch_monitor_jobs(app, args),
        "batch_cancel_jobs" => batch::batch_cancel_jobs(app, args).await,
        "batch_list_operations" => batch::batch_list_operations(app),
        "get_cache_statistics" => cache::get_cache_statistics(app),
        "clear_cache" => cache::clear_cache(app, args),
        "warm_cache" => cache::warm_cache(app, args).await,
        _ => return None,
    };
    Some(result)
}

/// Arguments of the tools addressing one build of one job.
#[derive(Deserialize)]
struct BuildArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    #[serde(alias = "buildNumber")]
    build_number: u64,
}

fn validate_build(job_name: &str, build_number: u64) -> Result<(), AppError> {
    validate_job_name(job_name)?;
    if build_number == 0 {
        return Err(AppError::validation("build_number must be at least 1"));
    }
    Ok(())
}

/// Deserialize tool arguments. A missing `arguments` member counts as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, AppError> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| AppError::validation(e.to_string()))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> ToolResult {
    serde_json::to_value(value)
        .map_err(|e| AppError::validation(format!("failed to encode response: {e}")))
}

/// Structured body of a failed tool call.
pub(crate) fn error_payload(err: &AppError) -> Value {
    let mut error = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let Some(attempts) = err.attempts() {
        error["attempts"] = json!(attempts);
    }
    json!({ "error": error })
}

/// MCP `tools/call` result wrapping `body` as a single text item.
pub(crate) fn tool_content(body: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    let mut result = json!({
        "content": [{ "type": "text", "text": text }]
    });
    if is_error {
        result["isError"] = Value::Bool(true);
    }
    result
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
