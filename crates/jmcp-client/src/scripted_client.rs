//! In-memory [`JobClient`] with scripted answers, used by tests and dry runs.
//!
//! Failures are queued per `(method, job)`; `"*"` as the job matches any job.
//! Every call is recorded, and concurrent `trigger_job` calls are counted so
//! callers can assert on their concurrency limits.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jmcp_core::models::{
    Artifact, ArtifactContent, BuildRef, BuildStatus, ConsoleLog, JobFilter, JobInfo, JobSummary,
    PipelineStatus, QueueItem, ServerInfo,
};
use jmcp_core::{UpstreamError, UpstreamErrorKind};

use crate::{ClientResult, JobClient};

pub const SCRIPTED_BASE_URL: &str = "http://jenkins.test/";
const ANY_JOB: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCall {
    TriggerJob {
        job_name: String,
        params: BTreeMap<String, String>,
    },
    Cancel {
        job_name: String,
        queue_url: String,
    },
    GetJobInfo(String),
    GetBuildStatus(String, u64),
    GetConsoleLog(String, u64, u64),
    ListJobs(JobFilter),
    GetPipelineStatus(String, u64),
    ListArtifacts(String, u64),
    FetchArtifact(String, u64, String),
    GetQueue,
    GetServerInfo,
    RecentBuilds(String, usize),
}

impl ClientCall {
    pub fn is_trigger_of(&self, job: &str) -> bool {
        matches!(self, ClientCall::TriggerJob { job_name, .. } if job_name == job)
    }
}

#[derive(Default)]
struct Script {
    calls: Vec<ClientCall>,
    failures: HashMap<(String, String), VecDeque<UpstreamError>>,
    trigger_delays: HashMap<String, Duration>,
    panicking_triggers: HashSet<String>,
    next_queue_id: u64,
    job_infos: HashMap<String, JobInfo>,
    build_statuses: HashMap<(String, u64), BuildStatus>,
    console_logs: HashMap<(String, u64), ConsoleLog>,
    pipelines: HashMap<(String, u64), PipelineStatus>,
    artifacts: HashMap<(String, u64), Vec<(Artifact, String)>>,
    builds: HashMap<String, Vec<BuildRef>>,
    jobs: Vec<JobSummary>,
    queue: Vec<QueueItem>,
    server_info: Option<ServerInfo>,
}

impl Script {
    fn take_failure(&mut self, method: &str, job: &str) -> Option<UpstreamError> {
        for key in [
            (method.to_string(), job.to_string()),
            (method.to_string(), ANY_JOB.to_string()),
        ] {
            if let Some(queue) = self.failures.get_mut(&key) {
                if let Some(err) = queue.pop_front() {
                    return Some(err);
                }
            }
        }
        None
    }
}

#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<Script>,
    default_trigger_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn not_found(operation: String, what: &str) -> UpstreamError {
    UpstreamError::new(
        UpstreamErrorKind::Status(404),
        operation,
        format!("HTTP 404 Not Found: {what}"),
    )
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `err` as the answer to the next `method` call for `job`
    /// (`"*"` for any job). Method names are the [`JobClient`] method names.
    pub fn fail_next(&self, method: &str, job: &str, err: UpstreamError) {
        self.lock()
            .failures
            .entry((method.to_string(), job.to_string()))
            .or_default()
            .push_back(err);
    }

    /// Queue `count` copies of a failure with `kind`.
    pub fn fail_times(&self, method: &str, job: &str, kind: UpstreamErrorKind, count: usize) {
        for _ in 0..count {
            self.fail_next(
                method,
                job,
                UpstreamError::new(kind, format!("{method}({job})"), "scripted failure"),
            );
        }
    }

    pub fn set_trigger_delay(&self, job: &str, delay: Duration) {
        self.lock().trigger_delays.insert(job.to_string(), delay);
    }

    /// Make every trigger of `job` panic, as a crashed worker would.
    pub fn panic_on_trigger(&self, job: &str) {
        self.lock().panicking_triggers.insert(job.to_string());
    }

    pub fn set_default_trigger_delay(&self, delay: Duration) {
        *self
            .default_trigger_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn add_job(&self, info: JobInfo) {
        let mut script = self.lock();
        script.jobs.push(JobSummary {
            name: info.name.rsplit('/').next().unwrap_or(&info.name).to_string(),
            full_name: info.name.clone(),
            url: info.url.clone(),
            color: Some("blue".into()),
            is_folder: false,
        });
        script.job_infos.insert(info.name.clone(), info);
    }

    pub fn add_job_summary(&self, summary: JobSummary) {
        self.lock().jobs.push(summary);
    }

    pub fn set_build_status(&self, status: BuildStatus) {
        let mut script = self.lock();
        let key = (status.job_name.clone(), status.build_number);
        let builds = script.builds.entry(status.job_name.clone()).or_default();
        if !builds.iter().any(|b| b.number == status.build_number) {
            builds.push(BuildRef {
                number: status.build_number,
                url: status.url.clone(),
            });
            builds.sort_by(|a, b| b.number.cmp(&a.number));
        }
        script.build_statuses.insert(key, status);
    }

    pub fn set_console_log(&self, log: ConsoleLog) {
        self.lock()
            .console_logs
            .insert((log.job_name.clone(), log.build_number), log);
    }

    pub fn set_pipeline(&self, pipeline: PipelineStatus) {
        self.lock()
            .pipelines
            .insert((pipeline.job_name.clone(), pipeline.build_number), pipeline);
    }

    /// Register an artifact of `job#build` with the given text content.
    pub fn add_artifact(&self, job: &str, build: u64, relative_path: &str, content: &str) {
        let file_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path)
            .to_string();
        self.lock()
            .artifacts
            .entry((job.to_string(), build))
            .or_default()
            .push((
                Artifact {
                    file_name,
                    relative_path: relative_path.to_string(),
                    size: Some(content.len() as u64),
                },
                content.to_string(),
            ));
    }

    pub fn set_queue(&self, items: Vec<QueueItem>) {
        self.lock().queue = items;
    }

    pub fn set_server_info(&self, info: ServerInfo) {
        self.lock().server_info = Some(info);
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ClientCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Jobs in the order their `trigger_job` calls started.
    pub fn trigger_order(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ClientCall::TriggerJob { job_name, .. } => Some(job_name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Highest number of `trigger_job` calls observed running at once.
    pub fn max_concurrent_triggers(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: ClientCall, method: &str, job: &str) -> ClientResult<()> {
        let mut script = self.lock();
        script.calls.push(call);
        match script.take_failure(method, job) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobClient for ScriptedClient {
    async fn trigger_job(
        &self,
        job_name: &str,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let (outcome, delay, panics) = {
            let mut script = self.lock();
            script.calls.push(ClientCall::TriggerJob {
                job_name: job_name.to_string(),
                params: params.clone(),
            });
            let outcome = script.take_failure("trigger_job", job_name);
            let delay = script.trigger_delays.get(job_name).copied();
            let panics = script.panicking_triggers.contains(job_name);
            (outcome, delay, panics)
        };
        if panics {
            panic!("scripted panic triggering {job_name}");
        }
        let delay = delay.unwrap_or_else(|| {
            *self
                .default_trigger_delay
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = outcome {
            return Err(err);
        }
        let mut script = self.lock();
        script.next_queue_id += 1;
        Ok(format!(
            "{SCRIPTED_BASE_URL}queue/item/{}/",
            script.next_queue_id
        ))
    }

    async fn cancel_queued_or_running(&self, job_name: &str, queue_url: &str) -> ClientResult<()> {
        self.record(
            ClientCall::Cancel {
                job_name: job_name.to_string(),
                queue_url: queue_url.to_string(),
            },
            "cancel_queued_or_running",
            job_name,
        )
    }

    async fn get_job_info(&self, job_name: &str) -> ClientResult<JobInfo> {
        self.record(
            ClientCall::GetJobInfo(job_name.to_string()),
            "get_job_info",
            job_name,
        )?;
        self.lock()
            .job_infos
            .get(job_name)
            .cloned()
            .ok_or_else(|| not_found(format!("get_job_info({job_name})"), job_name))
    }

    async fn get_build_status(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<BuildStatus> {
        self.record(
            ClientCall::GetBuildStatus(job_name.to_string(), build_number),
            "get_build_status",
            job_name,
        )?;
        self.lock()
            .build_statuses
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .ok_or_else(|| {
                not_found(
                    format!("get_build_status({job_name}#{build_number})"),
                    job_name,
                )
            })
    }

    async fn get_console_log(
        &self,
        job_name: &str,
        build_number: u64,
        start: u64,
    ) -> ClientResult<ConsoleLog> {
        self.record(
            ClientCall::GetConsoleLog(job_name.to_string(), build_number, start),
            "get_console_log",
            job_name,
        )?;
        let mut log = self
            .lock()
            .console_logs
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .ok_or_else(|| {
                not_found(
                    format!("get_console_log({job_name}#{build_number})"),
                    job_name,
                )
            })?;
        let offset = usize::try_from(start).unwrap_or(usize::MAX);
        log.log = log.log.get(offset..).unwrap_or_default().to_string();
        Ok(log)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> ClientResult<Vec<JobSummary>> {
        self.record(ClientCall::ListJobs(filter.clone()), "list_jobs", ANY_JOB)?;
        let script = self.lock();
        Ok(script
            .jobs
            .iter()
            .filter(|job| match filter.folder.as_deref() {
                None if filter.recursive => true,
                None => !job.full_name.contains('/'),
                Some(folder) => match job.full_name.strip_prefix(&format!("{folder}/")) {
                    Some(rest) => filter.recursive || !rest.contains('/'),
                    None => false,
                },
            })
            .filter(|job| filter.matches(job))
            .cloned()
            .collect())
    }

    async fn get_pipeline_status(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<PipelineStatus> {
        self.record(
            ClientCall::GetPipelineStatus(job_name.to_string(), build_number),
            "get_pipeline_status",
            job_name,
        )?;
        self.lock()
            .pipelines
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .ok_or_else(|| {
                not_found(
                    format!("get_pipeline_status({job_name}#{build_number})"),
                    job_name,
                )
            })
    }

    async fn list_artifacts(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<Vec<Artifact>> {
        self.record(
            ClientCall::ListArtifacts(job_name.to_string(), build_number),
            "list_artifacts",
            job_name,
        )?;
        Ok(self
            .lock()
            .artifacts
            .get(&(job_name.to_string(), build_number))
            .map(|list| list.iter().map(|(artifact, _)| artifact.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_artifact(
        &self,
        job_name: &str,
        build_number: u64,
        relative_path: &str,
        max_bytes: usize,
    ) -> ClientResult<ArtifactContent> {
        self.record(
            ClientCall::FetchArtifact(
                job_name.to_string(),
                build_number,
                relative_path.to_string(),
            ),
            "fetch_artifact",
            job_name,
        )?;
        let script = self.lock();
        let content = script
            .artifacts
            .get(&(job_name.to_string(), build_number))
            .and_then(|list| {
                list.iter()
                    .find(|(artifact, _)| artifact.relative_path == relative_path)
            })
            .map(|(_, content)| content.clone())
            .ok_or_else(|| {
                not_found(
                    format!("fetch_artifact({job_name}#{build_number})"),
                    relative_path,
                )
            })?;
        let bytes = content.as_bytes();
        let kept = &bytes[..bytes.len().min(max_bytes)];
        Ok(ArtifactContent {
            relative_path: relative_path.to_string(),
            bytes_read: kept.len(),
            truncated: bytes.len() > max_bytes,
            content: String::from_utf8_lossy(kept).into_owned(),
        })
    }

    async fn get_queue(&self) -> ClientResult<Vec<QueueItem>> {
        self.record(ClientCall::GetQueue, "get_queue", ANY_JOB)?;
        Ok(self.lock().queue.clone())
    }

    async fn get_server_info(&self) -> ClientResult<ServerInfo> {
        self.record(ClientCall::GetServerInfo, "get_server_info", ANY_JOB)?;
        Ok(self.lock().server_info.clone().unwrap_or_else(|| ServerInfo {
            version: Some("2.440.3".into()),
            url: SCRIPTED_BASE_URL.into(),
            mode: Some("NORMAL".into()),
            num_executors: Some(2),
            quieting_down: false,
        }))
    }

    async fn recent_builds(&self, job_name: &str, limit: usize) -> ClientResult<Vec<BuildRef>> {
        self.record(
            ClientCall::RecentBuilds(job_name.to_string(), limit),
            "recent_builds",
            job_name,
        )?;
        Ok(self
            .lock()
            .builds
            .get(job_name)
            .map(|builds| builds.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
