use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use jmcp_cache::cache_key;
use jmcp_core::models::Artifact;
use jmcp_core::{AppError, CacheTier, UpstreamError, validate_job_name};

use super::{BuildArgs, ToolResult, parse_args, validate_build};
use crate::app::App;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const DEFAULT_MAX_SIZE_MB: f64 = 1.0;
const MAX_SIZE_MB_LIMIT: f64 = 100.0;
const DEFAULT_MAX_BUILDS: usize = 10;
const MAX_BUILDS_LIMIT: usize = 50;

#[derive(Deserialize)]
struct DownloadArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    #[serde(alias = "buildNumber")]
    build_number: u64,
    #[serde(alias = "artifactPath", alias = "relative_path")]
    artifact_path: String,
    #[serde(default, alias = "maxSizeMb")]
    max_size_mb: Option<f64>,
}

#[derive(Deserialize)]
struct SearchArgs {
    #[serde(alias = "jobName")]
    job_name: String,
    pattern: String,
    #[serde(default, alias = "maxBuilds")]
    max_builds: Option<usize>,
    #[serde(default, alias = "useRegex")]
    use_regex: bool,
}

#[derive(Serialize)]
struct ArtifactMatch {
    build_number: u64,
    #[serde(flatten)]
    artifact: Artifact,
}

pub(super) async fn list_build_artifacts(app: &App, args: Value) -> ToolResult {
    let args: BuildArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let build_number = args.build_number;
    let number = build_number.to_string();
    let artifacts = app
        .cached_read(
            &[CacheTier::Permanent],
            &cache_key("artifacts", job_name, &[&number]),
            move || client.list_artifacts(job_name, build_number),
            |_| CacheTier::Permanent,
        )
        .await?;
    let count = artifacts.as_array().map_or(0, Vec::len);
    Ok(json!({
        "job_name": job_name,
        "build_number": build_number,
        "artifacts": artifacts,
        "count": count,
    }))
}

fn max_bytes(max_size_mb: Option<f64>) -> Result<usize, AppError> {
    let mb = max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB);
    if !mb.is_finite() || mb <= 0.0 || mb > MAX_SIZE_MB_LIMIT {
        return Err(AppError::validation(format!(
            "max_size_mb must be greater than 0 and at most {MAX_SIZE_MB_LIMIT} (got {mb})"
        )));
    }
    Ok((mb * BYTES_PER_MB) as usize)
}

pub(super) async fn download_build_artifact(app: &App, args: Value) -> ToolResult {
    let args: DownloadArgs = parse_args(args)?;
    validate_build(&args.job_name, args.build_number)?;
    if args.artifact_path.trim().is_empty() {
        return Err(AppError::validation("artifact_path cannot be empty"));
    }
    let limit = max_bytes(args.max_size_mb)?;

    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let build_number = args.build_number;
    let path = args.artifact_path.as_str();
    let number = build_number.to_string();
    let limit_text = limit.to_string();
    let mut content = app
        .cached_read(
            &[CacheTier::Permanent],
            &cache_key("artifact", job_name, &[&number, path, &limit_text]),
            move || client.fetch_artifact(job_name, build_number, path, limit),
            |_| CacheTier::Permanent,
        )
        .await?;
    content["job_name"] = json!(job_name);
    content["build_number"] = json!(build_number);
    Ok(content)
}

enum PathMatcher {
    Glob(Pattern),
    Regex(Regex),
}

impl PathMatcher {
    fn new(pattern: &str, use_regex: bool) -> Result<Self, AppError> {
        if pattern.is_empty() {
            return Err(AppError::validation("pattern cannot be empty"));
        }
        if use_regex {
            Regex::new(pattern)
                .map(Self::Regex)
                .map_err(|e| AppError::validation(format!("invalid regex '{pattern}': {e}")))
        } else {
            Pattern::new(pattern)
                .map(Self::Glob)
                .map_err(|e| AppError::validation(format!("invalid glob '{pattern}': {e}")))
        }
    }

    /// Matches the relative path or the bare file name.
    fn is_match(&self, artifact: &Artifact) -> bool {
        match self {
            Self::Glob(pattern) => {
                let options = MatchOptions {
                    case_sensitive: false,
                    ..MatchOptions::new()
                };
                pattern.matches_with(&artifact.relative_path, options)
                    || pattern.matches_with(&artifact.file_name, options)
            }
            Self::Regex(regex) => regex.is_match(&artifact.relative_path),
        }
    }
}

pub(super) async fn search_build_artifacts(app: &App, args: Value) -> ToolResult {
    let args: SearchArgs = parse_args(args)?;
    validate_job_name(&args.job_name)?;
    let max_builds = args.max_builds.unwrap_or(DEFAULT_MAX_BUILDS);
    if !(1..=MAX_BUILDS_LIMIT).contains(&max_builds) {
        return Err(AppError::validation(format!(
            "max_builds must be between 1 and {MAX_BUILDS_LIMIT} (got {max_builds})"
        )));
    }
    let matcher = PathMatcher::new(&args.pattern, args.use_regex)?;

    let client = app.client.as_ref();
    let job_name = args.job_name.as_str();
    let matcher = &matcher;
    let limit = max_builds.to_string();
    let mode = if args.use_regex { "regex" } else { "glob" };
    let matches = app
        .cached_read(
            &[CacheTier::SemiStatic],
            &cache_key("artifact_search", job_name, &[mode, &limit, &args.pattern]),
            move || async move {
                let mut matches = Vec::new();
                for build in client.recent_builds(job_name, max_builds).await? {
                    let artifacts = client.list_artifacts(job_name, build.number).await?;
                    matches.extend(
                        artifacts
                            .into_iter()
                            .filter(|artifact| matcher.is_match(artifact))
                            .map(|artifact| ArtifactMatch {
                                build_number: build.number,
                                artifact,
                            }),
                    );
                }
                Ok::<_, UpstreamError>(matches)
            },
            |_| CacheTier::SemiStatic,
        )
        .await?;
    let count = matches.as_array().map_or(0, Vec::len);
    Ok(json!({
        "job_name": job_name,
        "pattern": args.pattern,
        "max_builds": max_builds,
        "matches": matches,
        "count": count,
    }))
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
