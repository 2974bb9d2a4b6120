use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jmcp_client::JobClient;
use jmcp_core::{
    AppError, BatchOperation, JobTask, OperationStatus, TaskCounts, TaskResult, normalize_params,
};
use jmcp_executor::{RetryExecutor, is_retryable_trigger};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::handle::{BatchHandle, RemoteTarget, TriggerResult};

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_MAX_CONCURRENT_LIMIT: usize = 20;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Called with the job name after each successful trigger.
pub type TriggerHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    pub fail_fast: bool,
    pub wait_for_completion: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fail_fast: false,
            wait_for_completion: false,
        }
    }
}

/// Orchestrator-wide bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    /// Largest `max_concurrent` a caller may ask for.
    pub max_concurrent_limit: usize,
    /// How long terminal operations stay queryable.
    pub retention: Duration,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_concurrent_limit: DEFAULT_MAX_CONCURRENT_LIMIT,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// One line of [`BatchOrchestrator::list_operations`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationSummary {
    pub operation_id: Uuid,
    pub status: OperationStatus,
    pub total: usize,
    pub counts: TaskCounts,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&BatchOperation> for OperationSummary {
    fn from(op: &BatchOperation) -> Self {
        Self {
            operation_id: op.operation_id,
            status: op.status,
            total: op.tasks.len(),
            counts: op.counts(),
            created_at: op.created_at,
            finished_at: op.finished_at,
        }
    }
}

/// Runs groups of job triggers as tracked operations.
///
/// Each operation gets its own driver task that keeps at most
/// `max_concurrent` triggers in flight, dispatching in ascending priority
/// order (ties keep submission order).
pub struct BatchOrchestrator {
    client: Arc<dyn JobClient>,
    executor: RetryExecutor,
    limits: BatchLimits,
    on_triggered: Option<TriggerHook>,
    registry: RwLock<HashMap<Uuid, Arc<BatchHandle>>>,
}

impl BatchOrchestrator {
    pub fn new(client: Arc<dyn JobClient>, executor: RetryExecutor, limits: BatchLimits) -> Self {
        Self {
            client,
            executor,
            limits,
            on_triggered: None,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Run `hook` whenever a task of any operation has been queued upstream.
    pub fn with_trigger_hook(mut self, hook: TriggerHook) -> Self {
        self.on_triggered = Some(hook);
        self
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    fn lookup(&self, operation_id: Uuid) -> Result<Arc<BatchHandle>, AppError> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation_id)
            .cloned()
            .ok_or_else(|| AppError::OperationNotFound(operation_id.to_string()))
    }

    fn validate(&self, tasks: &[JobTask], options: &BatchOptions) -> Result<(), AppError> {
        if tasks.is_empty() {
            return Err(AppError::validation("a batch needs at least one job"));
        }
        if options.max_concurrent == 0 {
            return Err(AppError::validation("max_concurrent must be at least 1"));
        }
        if options.max_concurrent > self.limits.max_concurrent_limit {
            return Err(AppError::validation(format!(
                "max_concurrent must not exceed {} (got {})",
                self.limits.max_concurrent_limit, options.max_concurrent
            )));
        }
        tasks.iter().try_for_each(JobTask::validate)
    }

    /// Register a new operation and start dispatching it.
    ///
    /// Returns the operation as submitted, or its terminal state when
    /// `wait_for_completion` is set.
    pub async fn trigger_batch(
        &self,
        tasks: Vec<JobTask>,
        options: BatchOptions,
    ) -> Result<BatchOperation, AppError> {
        self.validate(&tasks, &options)?;

        let mut dispatch_order: Vec<usize> = (0..tasks.len()).collect();
        dispatch_order.sort_by_key(|&index| tasks[index].priority);
        let results = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| TaskResult::pending(index, task))
            .collect();
        let operation = BatchOperation {
            operation_id: Uuid::new_v4(),
            tasks,
            dispatch_order,
            max_concurrent: options.max_concurrent,
            fail_fast: options.fail_fast,
            wait_for_completion: options.wait_for_completion,
            status: OperationStatus::Pending,
            results,
            created_at: Utc::now(),
            finished_at: None,
            cancel_requested: false,
        };
        let operation_id = operation.operation_id;
        info!(
            %operation_id,
            tasks = operation.tasks.len(),
            max_concurrent = operation.max_concurrent,
            fail_fast = operation.fail_fast,
            "batch operation submitted"
        );

        let handle = Arc::new(BatchHandle::new(operation));
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation_id, handle.clone());

        let submitted = handle.snapshot();
        tokio::spawn(drive(
            handle.clone(),
            self.client.clone(),
            self.executor.clone(),
            self.on_triggered.clone(),
        ));

        if options.wait_for_completion {
            handle.wait_terminal().await;
            return Ok(handle.snapshot());
        }
        Ok(submitted)
    }

    /// Point-in-time copy of an operation.
    pub fn monitor_batch(&self, operation_id: Uuid) -> Result<BatchOperation, AppError> {
        Ok(self.lookup(operation_id)?.snapshot())
    }

    /// Cancel an operation: pending tasks are cancelled immediately, and with
    /// `cancel_running_builds` the builds of still-running triggers are
    /// stopped upstream on a best-effort basis once their queue item is
    /// known. Cancelling a terminal operation changes nothing.
    pub async fn cancel_batch(
        &self,
        operation_id: Uuid,
        cancel_running_builds: bool,
    ) -> Result<BatchOperation, AppError> {
        let handle = self.lookup(operation_id)?;
        if let Err(terminal) = handle.request_cancel(cancel_running_builds) {
            info!(%operation_id, status = ?terminal.status, "cancel of finished operation ignored");
            return Ok(terminal);
        }
        Ok(handle.snapshot())
    }

    /// Summaries of every tracked operation, oldest first.
    pub fn list_operations(&self) -> Vec<OperationSummary> {
        let handles: Vec<Arc<BatchHandle>> = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut summaries: Vec<OperationSummary> = handles
            .iter()
            .map(|handle| OperationSummary::from(&handle.snapshot()))
            .collect();
        summaries.sort_by_key(|summary| summary.created_at);
        summaries
    }

    /// Drop terminal operations that finished more than the retention period
    /// before `now`. Returns how many were removed.
    pub fn reap_finished(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.limits.retention)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = registry.len();
        registry.retain(|_, handle| {
            if !handle.is_terminal() {
                return true;
            }
            match handle.finished_at() {
                Some(finished) => now.signed_duration_since(finished) < retention,
                None => true,
            }
        });
        let removed = before - registry.len();
        if removed > 0 {
            info!(removed, "reaped finished batch operations");
        }
        removed
    }
}

/// Per-operation driver: keeps up to `max_concurrent` triggers in flight and
/// settles the operation once nothing is left running.
async fn drive(
    handle: Arc<BatchHandle>,
    client: Arc<dyn JobClient>,
    executor: RetryExecutor,
    on_triggered: Option<TriggerHook>,
) {
    let snapshot = handle.snapshot();
    let operation_id = snapshot.operation_id;
    let mut order = snapshot.dispatch_order.into_iter();
    let mut workers: JoinSet<(usize, Result<TriggerResult, tokio::task::JoinError>)> =
        JoinSet::new();

    loop {
        while workers.len() < snapshot.max_concurrent {
            let Some((index, task)) = handle.claim_next(&mut order) else {
                break;
            };
            let client = client.clone();
            let executor = executor.clone();
            // The inner spawn turns a panicking trigger into a JoinError we
            // can attribute to its task.
            workers.spawn(async move {
                let outcome = tokio::spawn(trigger(task, client, executor)).await;
                (index, outcome)
            });
        }

        let Some(joined) = workers.join_next().await else {
            break;
        };
        match joined {
            Ok((index, Ok(outcome))) => {
                if let (Ok(_), Some(hook)) = (&outcome, &on_triggered) {
                    hook(&snapshot.tasks[index].job_name);
                }
                if let Some(target) = handle.complete(index, outcome) {
                    stop_remote(&handle, client.as_ref(), target).await;
                }
            }
            Ok((index, Err(join_err))) => {
                error!(%operation_id, index, error = %join_err, "trigger worker died");
                handle.abandon(index, &format!("trigger worker died: {join_err}"));
            }
            Err(join_err) => {
                error!(%operation_id, error = %join_err, "batch worker join failed");
            }
        }
    }

    handle.settle();
}

async fn trigger(
    task: JobTask,
    client: Arc<dyn JobClient>,
    executor: RetryExecutor,
) -> TriggerResult {
    let params = normalize_params(&task.params);
    let label = format!("trigger_job({})", task.job_name);
    executor
        .execute(
            &label,
            || client.trigger_job(&task.job_name, &params),
            is_retryable_trigger,
        )
        .await
}

async fn stop_remote(handle: &BatchHandle, client: &dyn JobClient, target: RemoteTarget) {
    let outcome = client
        .cancel_queued_or_running(&target.job_name, &target.queue_url)
        .await;
    handle.record_remote_cancel(target.index, outcome);
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
