use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

use jmcp_cache::{GLOBAL_SCOPE, cache_key};
use jmcp_core::models::{JobFilter, JobSummary};
use jmcp_core::{AppError, CacheTier, normalize_params, validate_job_name};
use jmcp_executor::{RetryFailure, is_retryable_trigger};

use super::{ToolResult, parse_args};
use crate::app::App;

#[derive(Deserialize)]
struct TriggerArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct JobArgs {
    #[serde(alias = "jobName")]
    job_name: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    pattern: String,
    #[serde(default)]
    folder: Option<String>,
    #[serde(default = "search_recursive_default")]
    recursive: bool,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "buildingOnly")]
    building_only: bool,
}

fn search_recursive_default() -> bool {
    true
}

/// Listing entry with the status derived from the ball color.
#[derive(Serialize)]
struct JobView {
    name: String,
    full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    status: &'static str,
    building: bool,
    is_folder: bool,
}

impl From<JobSummary> for JobView {
    fn from(job: JobSummary) -> Self {
        Self {
            status: job.status(),
            building: job.is_building(),
            name: job.name,
            full_name: job.full_name,
            url: job.url,
            is_folder: job.is_folder,
        }
    }
}

fn job_views(jobs: Vec<JobSummary>) -> Vec<JobView> {
    jobs.into_iter().map(JobView::from).collect()
}

pub(super) async fn trigger_job(app: &App, args: Value) -> ToolResult {
    let args: TriggerArgs = parse_args(args)?;
    validate_job_name(&args.job_name)?;
    let processed = normalize_params(&args.params.unwrap_or_default());

    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let params = &processed;
    let outcome = app
        .executor
        .execute(
            &format!("trigger_job({job_name})"),
            move || client.trigger_job(job_name, params),
            is_retryable_trigger,
        )
        .await
        .map_err(RetryFailure::into_app_error)?;

    let invalidated = app.cache.invalidate_job_in(CacheTier::Dynamic, job_name);
    info!(
        job = job_name,
        queue_url = %outcome.value,
        attempts = outcome.attempts,
        invalidated,
        "job triggered"
    );
    Ok(json!({
        "job_name": job_name,
        "status": "Triggered",
        "queue_url": outcome.value,
        "processed_params": processed,
        "attempts": outcome.attempts,
    }))
}

pub(super) async fn get_job_info(app: &App, args: Value) -> ToolResult {
    let args: JobArgs = parse_args(args)?;
    validate_job_name(&args.job_name)?;
    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let value = app
        .cached_read(
            &[CacheTier::SemiStatic],
            &cache_key("job_info", job_name, &[]),
            move || client.get_job_info(job_name),
            |_| CacheTier::SemiStatic,
        )
        .await?;
    Ok(value)
}

/// Fetch a listing through the semi-static tier.
async fn cached_listing(app: &App, filter: &JobFilter) -> ToolResult {
    let client = app.client.as_ref();
    let key = cache_key("list_jobs", GLOBAL_SCOPE, &[&filter.cache_qualifier()]);
    let value = app
        .cached_read(
            &[CacheTier::SemiStatic],
            &key,
            move || async move { client.list_jobs(filter).await.map(job_views) },
            |_| CacheTier::SemiStatic,
        )
        .await?;
    Ok(value)
}

pub(super) async fn list_jobs(app: &App, args: Value) -> ToolResult {
    let filter: JobFilter = parse_args(args)?;
    if let Some(folder) = filter.folder.as_deref() {
        validate_job_name(folder)?;
    }
    let jobs = cached_listing(app, &filter).await?;
    let count = jobs.as_array().map_or(0, Vec::len);
    Ok(json!({ "jobs": jobs, "count": count }))
}

/// Glob when the pattern has metacharacters, otherwise a case-insensitive
/// substring.
enum NameMatcher {
    Glob(Pattern),
    Substring(String),
}

impl NameMatcher {
    fn new(pattern: &str) -> Result<Self, AppError> {
        if pattern.trim().is_empty() {
            return Err(AppError::validation("pattern cannot be empty"));
        }
        if pattern.contains(['*', '?', '[']) {
            Pattern::new(pattern)
                .map(Self::Glob)
                .map_err(|e| AppError::validation(format!("invalid glob '{pattern}': {e}")))
        } else {
            Ok(Self::Substring(pattern.to_lowercase()))
        }
    }

    fn is_match(&self, full_name: &str) -> bool {
        match self {
            Self::Glob(pattern) => {
                let options = MatchOptions {
                    case_sensitive: false,
                    ..MatchOptions::new()
                };
                let short_name = full_name.rsplit('/').next().unwrap_or(full_name);
                pattern.matches_with(full_name, options)
                    || pattern.matches_with(short_name, options)
            }
            Self::Substring(needle) => full_name.to_lowercase().contains(needle),
        }
    }
}

pub(super) async fn search_jobs(app: &App, args: Value) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    let matcher = NameMatcher::new(&args.pattern)?;
    if let Some(folder) = args.folder.as_deref() {
        validate_job_name(folder)?;
    }
    let filter = JobFilter {
        folder: args.folder,
        recursive: args.recursive,
        status: args.status,
        building_only: args.building_only,
    };

    let listing = cached_listing(app, &filter).await?;
    let matches: Vec<Value> = listing
        .as_array()
        .map(|jobs| {
            jobs.iter()
                .filter(|job| {
                    job.get("full_name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| matcher.is_match(name))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(json!({
        "pattern": args.pattern,
        "jobs": matches,
        "count": matches.len(),
    }))
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
