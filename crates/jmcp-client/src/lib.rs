//! Remote job client: the only component that talks to Jenkins.
//!
//! Everything above this crate depends on the [`JobClient`] trait; failures
//! are reported as [`UpstreamError`] so callers can tell transient from
//! permanent conditions without knowing about HTTP.

mod jenkins;
mod jenkins_parse;
mod scripted_client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use jmcp_core::UpstreamError;
use jmcp_core::models::{
    Artifact, ArtifactContent, BuildRef, BuildStatus, ConsoleLog, JobFilter, JobInfo, JobSummary,
    PipelineStatus, QueueItem, ServerInfo,
};

pub use jenkins::{JenkinsClient, JenkinsCredentials};
pub use jenkins_parse::queue_item_id;
pub use scripted_client::{ClientCall, SCRIPTED_BASE_URL, ScriptedClient};

pub type ClientResult<T> = Result<T, UpstreamError>;

/// Operations the server needs from Jenkins. One call is one logical
/// operation; implementations do not retry.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Queue a build. Returns the queue item URL.
    async fn trigger_job(
        &self,
        job_name: &str,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String>;

    /// Stop whatever the queue item became: remove it from the queue, or
    /// abort the build it started.
    async fn cancel_queued_or_running(&self, job_name: &str, queue_url: &str) -> ClientResult<()>;

    async fn get_job_info(&self, job_name: &str) -> ClientResult<JobInfo>;

    async fn get_build_status(&self, job_name: &str, build_number: u64)
    -> ClientResult<BuildStatus>;

    async fn get_console_log(
        &self,
        job_name: &str,
        build_number: u64,
        start: u64,
    ) -> ClientResult<ConsoleLog>;

    async fn list_jobs(&self, filter: &JobFilter) -> ClientResult<Vec<JobSummary>>;

    async fn get_pipeline_status(
        &self,
        job_name: &str,
        build_number: u64,
    ) -> ClientResult<PipelineStatus>;

    async fn list_artifacts(&self, job_name: &str, build_number: u64)
    -> ClientResult<Vec<Artifact>>;

    /// Download at most `max_bytes` of an artifact.
    async fn fetch_artifact(
        &self,
        job_name: &str,
        build_number: u64,
        relative_path: &str,
        max_bytes: usize,
    ) -> ClientResult<ArtifactContent>;

    async fn get_queue(&self) -> ClientResult<Vec<QueueItem>>;

    async fn get_server_info(&self) -> ClientResult<ServerInfo>;

    /// Most recent builds first, at most `limit`.
    async fn recent_builds(&self, job_name: &str, limit: usize) -> ClientResult<Vec<BuildRef>>;
}
