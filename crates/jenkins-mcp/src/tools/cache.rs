use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use jmcp_core::{AppError, CacheTier, validate_job_name};

use super::{ToolResult, error_payload, jobs, parse_args, server, to_json};
use crate::app::App;

/// Operations `warm_cache` knows how to prefetch, in default order.
const WARMABLE: [&str; 3] = ["server_info", "list_jobs", "get_queue_info"];

#[derive(Deserialize)]
struct ClearArgs {
    #[serde(default, alias = "cacheType")]
    cache_type: Option<String>,
    #[serde(default, alias = "jobName")]
    job_name: Option<String>,
}

#[derive(Deserialize)]
struct WarmArgs {
    #[serde(default)]
    operations: Option<Vec<String>>,
}

pub(super) fn get_cache_statistics(app: &App) -> ToolResult {
    to_json(&app.cache.stats())
}

pub(super) fn clear_cache(app: &App, args: Value) -> ToolResult {
    let args: ClearArgs = parse_args(args)?;
    let tier = args
        .cache_type
        .as_deref()
        .map(str::parse::<CacheTier>)
        .transpose()
        .map_err(|e| AppError::validation(e.to_string()))?;
    if let Some(job_name) = args.job_name.as_deref() {
        validate_job_name(job_name)?;
    }

    let cleared = match (tier, args.job_name.as_deref()) {
        (Some(tier), Some(job_name)) => app.cache.invalidate_job_in(tier, job_name),
        (Some(tier), None) => app.cache.invalidate_all(tier),
        (None, Some(job_name)) => app.cache.invalidate_job(job_name),
        (None, None) => app.cache.clear(),
    };
    info!(tier = ?tier, job = ?args.job_name, cleared, "cache cleared");
    Ok(json!({
        "cleared": cleared,
        "cache_type": tier.map_or("all", |tier| tier.as_str()),
        "job_name": args.job_name,
    }))
}

pub(super) async fn warm_cache(app: &App, args: Value) -> ToolResult {
    let args: WarmArgs = parse_args(args)?;
    let operations = match args.operations {
        Some(ops) if !ops.is_empty() => ops,
        _ => WARMABLE.iter().map(|op| op.to_string()).collect(),
    };
    if let Some(unknown) = operations.iter().find(|op| !WARMABLE.contains(&op.as_str())) {
        return Err(AppError::validation(format!(
            "cannot warm '{unknown}'; supported: {}",
            WARMABLE.join(", ")
        )));
    }

    let mut results = Vec::with_capacity(operations.len());
    let mut warmed = 0;
    for operation in &operations {
        let outcome = match operation.as_str() {
            "server_info" => server::server_info(app).await,
            "list_jobs" => jobs::list_jobs(app, Value::Null).await,
            _ => server::get_queue_info(app).await,
        };
        match outcome {
            Ok(_) => {
                warmed += 1;
                results.push(json!({ "operation": operation, "status": "warmed" }));
            }
            Err(e) => {
                warn!(operation = %operation, error = %e, "cache warm-up failed");
                let mut entry = error_payload(&e);
                entry["operation"] = json!(operation);
                entry["status"] = json!("error");
                results.push(entry);
            }
        }
    }
    Ok(json!({
        "warmed": warmed,
        "results": results,
        "stats": get_cache_statistics(app)?,
    }))
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
