use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;
pub const DEFAULT_PRIORITY: u8 = 5;

/// Cache partition, distinguished by how quickly the underlying data changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Server metadata that changes only on upgrades.
    Static,
    /// Job definitions and listings.
    SemiStatic,
    /// Running build state.
    Dynamic,
    /// Finished builds and their artifacts, which never change.
    Permanent,
    /// Queue contents and logs of running builds.
    Short,
}

impl CacheTier {
    pub const ALL: [CacheTier; 5] = [
        CacheTier::Static,
        CacheTier::SemiStatic,
        CacheTier::Dynamic,
        CacheTier::Permanent,
        CacheTier::Short,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::SemiStatic => "semi_static",
            Self::Dynamic => "dynamic",
            Self::Permanent => "permanent",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| AppError::CacheMisconfiguration(format!("unknown tier '{s}'")))
    }
}

/// TTL and capacity of one cache tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierPolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl TierPolicy {
    pub const fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }

    /// Built-in policy used when configuration omits a tier.
    pub const fn default_for(tier: CacheTier) -> Self {
        match tier {
            CacheTier::Static => Self::new(Duration::from_secs(3600), 100),
            CacheTier::SemiStatic => Self::new(Duration::from_secs(300), 500),
            CacheTier::Dynamic => Self::new(Duration::from_secs(30), 1000),
            CacheTier::Permanent => Self::new(Duration::from_secs(86_400), 2000),
            CacheTier::Short => Self::new(Duration::from_secs(10), 200),
        }
    }
}

/// Backoff settings for the retry executor. Loaded once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay downwards by up to half its value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Delay slept before retry number `attempt_index` (0-based):
    /// `min(base_delay * backoff_multiplier^attempt_index, max_delay)`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// One requested job trigger inside a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    pub job_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl JobTask {
    pub fn new(
        job_name: impl Into<String>,
        params: Map<String, Value>,
        priority: u8,
    ) -> Result<Self, AppError> {
        let task = Self {
            job_name: job_name.into(),
            params,
            priority,
        };
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_job_name(&self.job_name)?;
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(AppError::validation(format!(
                "priority for job '{}' must be between {} and {} (got {})",
                self.job_name, MIN_PRIORITY, MAX_PRIORITY, self.priority
            )));
        }
        Ok(())
    }
}

/// Job names may contain `/` for folders but no empty segments.
pub fn validate_job_name(job_name: &str) -> Result<(), AppError> {
    if job_name.trim().is_empty() {
        return Err(AppError::validation("job_name cannot be empty"));
    }
    if job_name.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(AppError::validation(format!(
            "job_name '{job_name}' contains an empty folder segment"
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Outcome of asking Jenkins to stop a build that was already dispatched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RemoteCancel {
    /// Requested while the trigger call was still in flight.
    Requested,
    /// Jenkins accepted the cancel call.
    Sent,
    /// The cancel call failed; the build may still run.
    Failed { message: String },
    /// Nothing to cancel upstream (the trigger itself failed).
    NotApplicable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Position of the task in the submitted list.
    pub index: usize,
    pub job_name: String,
    pub priority: u8,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_cancel: Option<RemoteCancel>,
}

impl TaskResult {
    pub fn pending(index: usize, task: &JobTask) -> Self {
        Self {
            index,
            job_name: task.job_name.clone(),
            priority: task.priority,
            state: TaskState::Pending,
            queue_url: None,
            error: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
            remote_cancel: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyFailed | Self::Failed | Self::Cancelled
        )
    }
}

/// Per-state task counts of one batch operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// A group of job triggers tracked under one id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub operation_id: Uuid,
    /// Tasks in submission order.
    pub tasks: Vec<JobTask>,
    /// Submission indices in dispatch order (stable sort by priority).
    pub dispatch_order: Vec<usize>,
    pub max_concurrent: usize,
    pub fail_fast: bool,
    pub wait_for_completion: bool,
    pub status: OperationStatus,
    /// One entry per task, indexed by submission position.
    pub results: Vec<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
}

impl BatchOperation {
    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for result in &self.results {
            match result.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Succeeded => counts.succeeded += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
