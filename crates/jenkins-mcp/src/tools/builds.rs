use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use jmcp_cache::cache_key;
use jmcp_core::models::{BuildStatus, ConsoleLog};
use jmcp_core::CacheTier;

use super::{BuildArgs, ToolResult, parse_args, validate_build};
use crate::app::App;

const SUMMARIZE_LOG_PROMPT: &str = "Summarize the following Jenkins console log. Identify any \
errors, critical warnings, or the root cause of a failure. Provide a concise summary of the \
build's outcome:\n\n";

/// Only the end of the log goes into the prompt.
const SUMMARY_LOG_TAIL_BYTES: usize = 16 * 1024;

#[derive(Deserialize)]
struct ConsoleArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    #[serde(alias = "buildNumber")]
    build_number: u64,
    #[serde(default)]
    start: u64,
}

pub(super) async fn get_build_status(app: &App, args: Value) -> ToolResult {
    let args: BuildArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let build_number = args.build_number;
    let number = build_number.to_string();
    let value = app
        .cached_read(
            &[CacheTier::Permanent, CacheTier::Dynamic],
            &cache_key("build_status", job_name, &[&number]),
            move || client.get_build_status(job_name, build_number),
            |status: &BuildStatus| {
                if status.is_final() {
                    CacheTier::Permanent
                } else {
                    CacheTier::Dynamic
                }
            },
        )
        .await?;
    Ok(value)
}

async fn console_log(app: &App, job_name: &str, build_number: u64, start: u64) -> ToolResult {
    let client = app.client.as_ref();
    let number = build_number.to_string();
    let offset = start.to_string();
    let value = app
        .cached_read(
            &[CacheTier::Dynamic, CacheTier::Short],
            &cache_key("console_log", job_name, &[&number, &offset]),
            move || client.get_console_log(job_name, build_number, start),
            |log: &ConsoleLog| {
                if log.has_more {
                    CacheTier::Short
                } else {
                    CacheTier::Dynamic
                }
            },
        )
        .await?;
    Ok(value)
}

pub(super) async fn get_console_log(app: &App, args: Value) -> ToolResult {
    let args: ConsoleArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    console_log(app, &args.job_name, args.build_number, args.start).await
}

pub(super) async fn get_pipeline_status(app: &App, args: Value) -> ToolResult {
    let args: BuildArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let build_number = args.build_number;
    let number = build_number.to_string();
    let value = app
        .cached_read(
            &[CacheTier::Dynamic],
            &cache_key("pipeline", job_name, &[&number]),
            move || client.get_pipeline_status(job_name, build_number),
            |_| CacheTier::Dynamic,
        )
        .await?;
    Ok(value)
}

/// Last `max_bytes` of `log`, cut on a character boundary.
fn log_tail(log: &str, max_bytes: usize) -> &str {
    if log.len() <= max_bytes {
        return log;
    }
    let mut cut = log.len() - max_bytes;
    while !log.is_char_boundary(cut) {
        cut += 1;
    }
    &log[cut..]
}

pub(super) async fn summarize_build_log(app: &App, args: Value) -> ToolResult {
    let args: BuildArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    let log = console_log(app, &args.job_name, args.build_number, 0).await?;
    let text = log.get("log").and_then(Value::as_str).unwrap_or_default();
    let tail = log_tail(text, SUMMARY_LOG_TAIL_BYTES);

    info!(
        job = %args.job_name,
        build = args.build_number,
        log_bytes = text.len(),
        prompt_log_bytes = tail.len(),
        "built log summary prompt"
    );
    Ok(json!({
        "summary": format!(
            "LLM summary for '{}' build #{} would be generated here.",
            args.job_name, args.build_number
        ),
        "prompt_used": format!("{SUMMARIZE_LOG_PROMPT}{tail}"),
        "log_truncated": tail.len() < text.len(),
        "sampling_config": {
            "temperature": 0.5,
            "top_p": 0.95,
            "max_tokens": 1024,
            "frequency_penalty": 0,
            "presence_penalty": 0
        }
    }))
}

#[cfg(test)]
#[path = "builds_tests.rs"]
mod tests;
