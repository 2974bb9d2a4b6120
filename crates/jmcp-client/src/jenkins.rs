//! [`JobClient`] over the Jenkins REST API.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use jmcp_core::models::{
    Artifact, ArtifactContent, BuildRef, BuildStatus, ConsoleLog, JobFilter, JobInfo, JobSummary,
    PipelineStatus, QueueItem, ServerInfo,
};
use jmcp_core::{AppError, UpstreamError, UpstreamErrorKind};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{RequestBuilder, Response, Url};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::jenkins_parse::{
    parse_artifacts, parse_build_status, parse_builds, parse_job_info, parse_job_list,
    parse_pipeline, parse_queue, parse_server_info, queue_item_executable, queue_item_id,
};
use crate::{ClientResult, JobClient};

/// Folder nesting followed by recursive job listings.
const MAX_FOLDER_DEPTH: usize = 8;
/// Longest error body excerpt kept in an [`UpstreamError`] message.
const BODY_EXCERPT_CHARS: usize = 200;
const JOB_TREE: &str = "jobs[_class,name,fullName,url,color]";

#[derive(Clone)]
pub struct JenkinsCredentials {
    pub user: String,
    pub api_token: String,
}

impl std::fmt::Debug for JenkinsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsCredentials")
            .field("user", &self.user)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

type Crumb = (String, String);

pub struct JenkinsClient {
    base: Url,
    credentials: Option<JenkinsCredentials>,
    http: reqwest::Client,
    /// `None` until fetched; `Some(None)` when the server issues no crumbs.
    crumb: Mutex<Option<Option<Crumb>>>,
}

impl JenkinsClient {
    pub fn new(
        base_url: &str,
        credentials: Option<JenkinsCredentials>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| AppError::validation(format!("invalid Jenkins URL '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(AppError::validation(format!(
                "Jenkins URL must be http(s): '{base_url}'"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base,
            credentials,
            http,
            crumb: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// `base/segments...`
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `base/job/a/job/b/tail...` for the folder-qualified name `a/b`.
    fn job_url(&self, job_name: &str, tail: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for part in job_name.split('/') {
                path.push("job").push(part);
            }
            path.extend(tail);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.user, Some(&creds.api_token)),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> ClientResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, %status, "jenkins returned an error status");
        Err(UpstreamError::new(
            UpstreamErrorKind::Status(status.as_u16()),
            operation,
            format!("HTTP {status}: {}", excerpt(&body)),
        ))
    }

    async fn get(&self, operation: &str, url: Url) -> ClientResult<Response> {
        debug!(operation, %url, "GET");
        self.send(operation, self.http.get(url)).await
    }

    async fn get_json(&self, operation: &str, url: Url) -> ClientResult<Value> {
        let response = self.get(operation, url).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| transport_error(operation, &e))
    }

    async fn crumb(&self) -> ClientResult<Option<Crumb>> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }
        let url = self.url(&["crumbIssuer", "api", "json"]);
        let fetched = match self.get_json("fetch_crumb", url).await {
            Ok(data) => match (
                data.get("crumbRequestField").and_then(Value::as_str),
                data.get("crumb").and_then(Value::as_str),
            ) {
                (Some(field), Some(value)) => Some((field.to_string(), value.to_string())),
                _ => None,
            },
            Err(err) if err.status() == Some(404) => None,
            Err(err) => return Err(err),
        };
        *cached = Some(fetched.clone());
        Ok(fetched)
    }

    /// POST with a CSRF crumb. A 403 drops the cached crumb and is retried
    /// once with a fresh one; a rejected request was never applied.
    async fn post(&self, operation: &str, url: Url) -> ClientResult<Response> {
        debug!(operation, %url, "POST");
        let mut refreshed = false;
        loop {
            let crumb = self.crumb().await?;
            let mut request = self.http.post(url.clone());
            if let Some((field, value)) = &crumb {
                request = request.header(field.as_str(), value.as_str());
            }
            match self.send(operation, request).await {
                Err(err) if err.status() == Some(403) && crumb.is_some() && !refreshed => {
                    warn!(operation, "crumb rejected, fetching a new one");
                    *self.crumb.lock().await = None;
                    refreshed = true;
                }
                other => return other,
            }
        }
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> UpstreamError {
    let kind = if err.is_connect() {
        UpstreamErrorKind::Connect
    } else if err.is_decode() {
        UpstreamErrorKind::Decode
    } else {
        // Anything else happened after the request may have left.
        UpstreamErrorKind::Timeout
    };
    UpstreamError::new(kind, operation, err.to_string())
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{cut}...")
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[async_trait]
impl JobClient for JenkinsClient {
    async fn trigger_job(
        &self,
        job_name: &str,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String> {
        let operation = format!("trigger_job({job_name})");
        let endpoint = if params.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let mut url = self.job_url(job_name, &[endpoint]);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        let response = self.post(&operation, url).await?;
        let queue_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| {
                UpstreamError::new(
                    UpstreamErrorKind::Decode,
                    &operation,
                    "build was accepted but no queue Location was returned",
                )
            })?;
        debug!(job = job_name, queue_url, "build queued");
        Ok(queue_url)
    }

    async fn cancel_queued_or_running(&self, job_name: &str, queue_url: &str) -> ClientResult<()> {
        let operation = format!("cancel({job_name})");
        let id = queue_item_id(queue_url).ok_or_else(|| {
            UpstreamError::new(
                UpstreamErrorKind::Decode,
                &operation,
                format!("not a queue item URL: {queue_url}"),
            )
        })?;
        let item_url = self.url(&["queue", "item", &id.to_string(), "api", "json"]);
        let item = self.get_json(&operation, item_url).await?;
        match queue_item_executable(&item) {
            Some(number) => {
                let url = self.job_url(job_name, &[&number.to_string(), "stop"]);
                self.post(&operation, url).await?;
                debug!(job = job_name, build = number, "requested build stop");
            }
            None => {
                let mut url = self.url(&["queue", "cancelItem"]);
                url.query_pairs_mut().append_pair("id", &id.to_string());
                self.post(&operation, url).await?;
                debug!(job = job_name, queue_id = id, "removed queue item");
            }
        }
        Ok(())
    }

    async fn get_job_info(&self, job_name: &str) -> ClientResult<JobInfo> {
        let operation = format!("get_job_info({job_name})");
        let data = self
            .get_json(&operation, self.job_url(job_name, &["api", "json"]))
            .await?;
        Ok(parse_job_info(job_name, &data))
    }

    async fn get_build_status(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<BuildStatus> {
        let operation = format!("get_build_status({job_name}#{build_number})");
        let url = self.job_url(job_name, &[&build_number.to_string(), "api", "json"]);
        let data = self.get_json(&operation, url).await?;
        Ok(parse_build_status(job_name, build_number, &data))
    }

    async fn get_console_log(
        &self,
        job_name: &str,
        build_number: u64,
        start: u64,
    ) -> ClientResult<ConsoleLog> {
        let operation = format!("get_console_log({job_name}#{build_number})");
        let mut url = self.job_url(
            job_name,
            &[&build_number.to_string(), "logText", "progressiveText"],
        );
        url.query_pairs_mut()
            .append_pair("start", &start.to_string());
        let response = self.get(&operation, url).await?;
        let has_more = header_str(response.headers(), "X-More-Data")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let log_size = header_str(response.headers(), "X-Text-Size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let log = response
            .text()
            .await
            .map_err(|e| transport_error(&operation, &e))?;
        Ok(ConsoleLog {
            job_name: job_name.to_string(),
            build_number,
            log,
            has_more,
            log_size,
        })
    }

    async fn list_jobs(&self, filter: &JobFilter) -> ClientResult<Vec<JobSummary>> {
        let operation = "list_jobs";
        let root = filter.folder.clone().unwrap_or_default();
        let mut pending = VecDeque::from([(root, 0usize)]);
        let mut jobs = Vec::new();
        while let Some((folder, depth)) = pending.pop_front() {
            let mut url = if folder.is_empty() {
                self.url(&["api", "json"])
            } else {
                self.job_url(&folder, &["api", "json"])
            };
            url.query_pairs_mut().append_pair("tree", JOB_TREE);
            let data = self.get_json(operation, url).await?;
            for job in parse_job_list(&folder, &data) {
                if job.is_folder && filter.recursive {
                    if depth + 1 < MAX_FOLDER_DEPTH {
                        pending.push_back((job.full_name.clone(), depth + 1));
                    } else {
                        warn!(folder = %job.full_name, "folder nesting too deep, not descending");
                    }
                }
                if filter.matches(&job) {
                    jobs.push(job);
                }
            }
        }
        Ok(jobs)
    }

    async fn get_pipeline_status(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<PipelineStatus> {
        let operation = format!("get_pipeline_status({job_name}#{build_number})");
        let url = self.job_url(job_name, &[&build_number.to_string(), "wfapi", "describe"]);
        let data = self.get_json(&operation, url).await?;
        Ok(parse_pipeline(job_name, build_number, &data))
    }

    async fn list_artifacts(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<Vec<Artifact>> {
        let operation = format!("list_artifacts({job_name}#{build_number})");
        let mut url = self.job_url(job_name, &[&build_number.to_string(), "api", "json"]);
        url.query_pairs_mut()
            .append_pair("tree", "artifacts[fileName,relativePath]");
        let data = self.get_json(&operation, url).await?;
        Ok(parse_artifacts(&data))
    }

    async fn fetch_artifact(
        &self,
        job_name: &str,
        build_number: u64,
        relative_path: &str,
        max_bytes: usize,
    ) -> ClientResult<ArtifactContent> {
        let operation = format!("fetch_artifact({job_name}#{build_number}:{relative_path})");
        let number = build_number.to_string();
        let mut tail = vec![number.as_str(), "artifact"];
        tail.extend(relative_path.split('/').filter(|s| !s.is_empty()));
        let mut response = self.get(&operation, self.job_url(job_name, &tail)).await?;

        let mut bytes: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(&operation, &e))?
        {
            let room = max_bytes.saturating_sub(bytes.len());
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.contains(&0) {
            return Err(UpstreamError::new(
                UpstreamErrorKind::Decode,
                operation,
                "artifact is binary, only text artifacts can be downloaded",
            ));
        }
        Ok(ArtifactContent {
            relative_path: relative_path.to_string(),
            bytes_read: bytes.len(),
            truncated,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn get_queue(&self) -> ClientResult<Vec<QueueItem>> {
        let data = self
            .get_json("get_queue", self.url(&["queue", "api", "json"]))
            .await?;
        Ok(parse_queue(&data))
    }

    async fn get_server_info(&self) -> ClientResult<ServerInfo> {
        let operation = "get_server_info";
        let response = self.get(operation, self.url(&["api", "json"])).await?;
        let version = header_str(response.headers(), "X-Jenkins");
        let data = response
            .json::<Value>()
            .await
            .map_err(|e| transport_error(operation, &e))?;
        Ok(parse_server_info(self.base.as_str(), version, &data))
    }

    async fn recent_builds(&self, job_name: &str, limit: usize) -> ClientResult<Vec<BuildRef>> {
        let operation = format!("recent_builds({job_name})");
        let mut url = self.job_url(job_name, &["api", "json"]);
        url.query_pairs_mut()
            .append_pair("tree", &format!("builds[number,url]{{0,{limit}}}"));
        let data = self.get_json(&operation, url).await?;
        Ok(parse_builds(&data, limit))
    }
}
