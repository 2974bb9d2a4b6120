//! Read models returned by the remote job client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub buildable: bool,
    pub in_queue: bool,
    pub parameters: Vec<JobParameter>,
    pub last_build_number: Option<u64>,
    pub last_completed_build_number: Option<u64>,
}

/// Entry of a job listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub name: String,
    /// Folder-qualified name, e.g. `team/service/deploy`.
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Jenkins ball color (`blue`, `red_anime`, ...). Absent for folders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub is_folder: bool,
}

impl JobSummary {
    /// Last result derived from the ball color.
    pub fn status(&self) -> &'static str {
        let color = self.color.as_deref().unwrap_or("");
        match color.trim_end_matches("_anime") {
            "blue" | "green" => "success",
            "red" => "failure",
            "yellow" => "unstable",
            "aborted" => "aborted",
            "disabled" => "disabled",
            "notbuilt" => "not_built",
            "" if self.is_folder => "folder",
            _ => "unknown",
        }
    }

    pub fn is_building(&self) -> bool {
        self.color
            .as_deref()
            .is_some_and(|color| color.ends_with("_anime"))
    }
}

/// Narrowing applied to job listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Only list jobs inside this folder.
    #[serde(default)]
    pub folder: Option<String>,
    /// Descend into sub-folders.
    #[serde(default)]
    pub recursive: bool,
    /// Keep jobs whose [`JobSummary::status`] equals this value.
    #[serde(default)]
    pub status: Option<String>,
    /// Keep only jobs that are currently building.
    #[serde(default)]
    pub building_only: bool,
}

impl JobFilter {
    pub fn matches(&self, job: &JobSummary) -> bool {
        if let Some(status) = self.status.as_deref() {
            if !job.status().eq_ignore_ascii_case(status) {
                return false;
            }
        }
        if self.building_only && !job.is_building() {
            return false;
        }
        true
    }

    /// Stable text used as a cache key qualifier.
    pub fn cache_qualifier(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.folder.as_deref().unwrap_or(""),
            self.recursive,
            self.status.as_deref().unwrap_or(""),
            self.building_only
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub job_name: String,
    pub build_number: u64,
    /// `SUCCESS`, `FAILURE`, `UNSTABLE`, `ABORTED`, `BUILDING` or `UNKNOWN`.
    pub status: String,
    pub building: bool,
    pub timestamp: Option<i64>,
    pub duration: Option<i64>,
    pub url: Option<String>,
}

impl BuildStatus {
    /// A finished build with a recorded result never changes again.
    pub fn is_final(&self) -> bool {
        !self.building && self.status != "UNKNOWN" && self.status != "BUILDING"
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLog {
    pub job_name: String,
    pub build_number: u64,
    pub log: String,
    /// Jenkins reports more output will follow (build still running).
    pub has_more: bool,
    /// Offset to pass as `start` to continue reading.
    pub log_size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: String,
    pub name: String,
    pub status: String,
    pub duration_millis: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub job_name: String,
    pub build_number: u64,
    pub status: String,
    pub stages: Vec<PipelineStage>,
}

impl PipelineStatus {
    pub fn is_final(&self) -> bool {
        !matches!(
            self.status.as_str(),
            "IN_PROGRESS" | "QUEUED" | "PAUSED_PENDING_INPUT" | "NOT_EXECUTED" | "UNKNOWN"
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_name: String,
    pub relative_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactContent {
    pub relative_path: String,
    pub bytes_read: usize,
    /// The artifact was larger than the requested limit.
    pub truncated: bool,
    /// Content decoded as UTF-8, invalid sequences replaced.
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    pub blocked: bool,
    pub stuck: bool,
    pub in_queue_since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_executors: Option<u64>,
    pub quieting_down: bool,
}
