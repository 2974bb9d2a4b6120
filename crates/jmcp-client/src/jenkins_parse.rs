//! Mapping of Jenkins JSON API payloads onto the shared read models.

use jmcp_core::models::{
    Artifact, BuildRef, BuildStatus, JobInfo, JobParameter, JobSummary, PipelineStage,
    PipelineStatus, QueueItem, ServerInfo,
};
use serde_json::Value;

const PARAMETERS_PROPERTY: &str = "hudson.model.ParametersDefinitionProperty";

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn build_number(value: &Value, key: &str) -> Option<u64> {
    value.get(key)?.get("number")?.as_u64()
}

pub(crate) fn parse_job_info(job_name: &str, data: &Value) -> JobInfo {
    let parameters = data
        .get("property")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|prop| prop.get("_class").and_then(Value::as_str) == Some(PARAMETERS_PROPERTY))
        .flat_map(|prop| {
            prop.get("parameterDefinitions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        })
        .map(|def| JobParameter {
            name: str_field(&def, "name").unwrap_or_default(),
            param_type: str_field(&def, "type").unwrap_or_else(|| "unknown".to_string()),
            default_value: def
                .get("defaultParameterValue")
                .and_then(|d| d.get("value"))
                .cloned()
                .filter(|v| !v.is_null()),
            description: str_field(&def, "description").filter(|d| !d.is_empty()),
            choices: def.get("choices").and_then(Value::as_array).map(|choices| {
                choices
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            }),
        })
        .collect();

    JobInfo {
        name: job_name.to_string(),
        url: str_field(data, "url"),
        description: str_field(data, "description").filter(|d| !d.is_empty()),
        buildable: bool_field(data, "buildable"),
        in_queue: bool_field(data, "inQueue"),
        parameters,
        last_build_number: build_number(data, "lastBuild"),
        last_completed_build_number: build_number(data, "lastCompletedBuild"),
    }
}

pub(crate) fn parse_build_status(job_name: &str, number: u64, data: &Value) -> BuildStatus {
    let building = bool_field(data, "building");
    let status = str_field(data, "result").unwrap_or_else(|| {
        if building {
            "BUILDING".to_string()
        } else {
            "UNKNOWN".to_string()
        }
    });
    BuildStatus {
        job_name: job_name.to_string(),
        build_number: number,
        status,
        building,
        timestamp: data.get("timestamp").and_then(Value::as_i64),
        duration: data.get("duration").and_then(Value::as_i64),
        url: str_field(data, "url"),
    }
}

/// Whether a `jobs[]` entry is a container of other jobs.
pub(crate) fn is_folder_class(class: &str) -> bool {
    class.ends_with(".Folder")
        || class.ends_with("OrganizationFolder")
        || class.ends_with("WorkflowMultiBranchProject")
}

/// Parse the `jobs` array of a root or folder listing. `parent` is the
/// folder path of the listing, empty at the root.
pub(crate) fn parse_job_list(parent: &str, data: &Value) -> Vec<JobSummary> {
    data.get("jobs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|job| {
            let name = str_field(job, "name")?;
            let full_name = str_field(job, "fullName").unwrap_or_else(|| {
                if parent.is_empty() {
                    name.clone()
                } else {
                    format!("{parent}/{name}")
                }
            });
            let is_folder = job
                .get("_class")
                .and_then(Value::as_str)
                .is_some_and(is_folder_class);
            Some(JobSummary {
                name,
                full_name,
                url: str_field(job, "url"),
                color: str_field(job, "color"),
                is_folder,
            })
        })
        .collect()
}

pub(crate) fn parse_pipeline(job_name: &str, number: u64, data: &Value) -> PipelineStatus {
    let stages = data
        .get("stages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|stage| PipelineStage {
            id: match stage.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            name: str_field(stage, "name").unwrap_or_default(),
            status: str_field(stage, "status").unwrap_or_else(|| "UNKNOWN".to_string()),
            duration_millis: stage.get("durationMillis").and_then(Value::as_i64),
        })
        .collect();
    PipelineStatus {
        job_name: job_name.to_string(),
        build_number: number,
        status: str_field(data, "status").unwrap_or_else(|| "UNKNOWN".to_string()),
        stages,
    }
}

pub(crate) fn parse_artifacts(data: &Value) -> Vec<Artifact> {
    data.get("artifacts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|artifact| {
            Some(Artifact {
                file_name: str_field(artifact, "fileName")?,
                relative_path: str_field(artifact, "relativePath")?,
                size: artifact.get("size").and_then(Value::as_u64),
            })
        })
        .collect()
}

pub(crate) fn parse_queue(data: &Value) -> Vec<QueueItem> {
    data.get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| {
            Some(QueueItem {
                id: item.get("id")?.as_u64()?,
                job_name: item
                    .get("task")
                    .and_then(|task| str_field(task, "name")),
                why: str_field(item, "why"),
                blocked: bool_field(item, "blocked"),
                stuck: bool_field(item, "stuck"),
                in_queue_since: item.get("inQueueSince").and_then(Value::as_i64),
                url: str_field(item, "url"),
            })
        })
        .collect()
}

pub(crate) fn parse_server_info(base_url: &str, version: Option<String>, data: &Value) -> ServerInfo {
    ServerInfo {
        version: version.or_else(|| str_field(data, "jenkinsVersion")),
        url: base_url.to_string(),
        mode: str_field(data, "mode"),
        num_executors: data.get("numExecutors").and_then(Value::as_u64),
        quieting_down: bool_field(data, "quietingDown"),
    }
}

pub(crate) fn parse_builds(data: &Value, limit: usize) -> Vec<BuildRef> {
    data.get("builds")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|build| {
            Some(BuildRef {
                number: build.get("number")?.as_u64()?,
                url: str_field(build, "url"),
            })
        })
        .take(limit)
        .collect()
}

/// Build number a queue item turned into, if it already left the queue.
pub(crate) fn queue_item_executable(data: &Value) -> Option<u64> {
    data.get("executable")?.get("number")?.as_u64()
}

/// Numeric id of a queue item URL such as `https://ci/queue/item/42/`.
pub fn queue_item_id(queue_url: &str) -> Option<u64> {
    let mut segments = queue_url.trim_end_matches('/').rsplit('/');
    let id = segments.next()?.parse().ok()?;
    (segments.next()? == "item").then_some(id)
}

#[cfg(test)]
#[path = "jenkins_parse_tests.rs"]
mod tests;
