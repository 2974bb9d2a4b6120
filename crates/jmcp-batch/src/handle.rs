//! Shared state of one batch operation.
//!
//! All mutation goes through the operation's own lock, which is never held
//! across an await point. Status changes are published on a watch channel
//! so waiters can block until the operation is terminal.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use jmcp_core::{BatchOperation, JobTask, OperationStatus, RemoteCancel, TaskState, UpstreamError};
use jmcp_executor::{RetryFailure, RetryOutcome};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub(crate) const SKIPPED_AFTER_FAIL_FAST: &str = "skipped after fail-fast";
pub(crate) const CANCELLED_BEFORE_DISPATCH: &str = "cancelled before dispatch";

pub(crate) type TriggerResult = Result<RetryOutcome<String>, RetryFailure<UpstreamError>>;

/// A build that should be stopped upstream.
#[derive(Debug, Clone)]
pub(crate) struct RemoteTarget {
    pub index: usize,
    pub job_name: String,
    pub queue_url: String,
}

pub(crate) struct BatchHandle {
    state: Mutex<BatchOperation>,
    status: watch::Sender<OperationStatus>,
}

impl BatchHandle {
    pub(crate) fn new(operation: BatchOperation) -> Self {
        let (status, _) = watch::channel(operation.status);
        Self {
            state: Mutex::new(operation),
            status,
        }
    }

    // Updates are applied field by field with no panicking calls in between.
    fn lock(&self) -> MutexGuard<'_, BatchOperation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> BatchOperation {
        self.lock().clone()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.lock().status.is_terminal()
    }

    pub(crate) fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lock().finished_at
    }

    fn set_status(&self, op: &mut BatchOperation, status: OperationStatus) {
        if op.status == status {
            return;
        }
        op.status = status;
        if status.is_terminal() {
            op.finished_at = Some(Utc::now());
        }
        self.status.send_replace(status);
    }

    /// Mark the next PENDING task in dispatch order RUNNING and hand it out.
    /// Returns `None` once dispatching must stop (cancel, fail-fast) or no
    /// pending task is left.
    pub(crate) fn claim_next(
        &self,
        order: &mut impl Iterator<Item = usize>,
    ) -> Option<(usize, JobTask)> {
        let mut guard = self.lock();
        let op = &mut *guard;
        if op.status.is_terminal() || op.cancel_requested || (op.fail_fast && op.counts().failed > 0)
        {
            return None;
        }
        for index in order.by_ref() {
            if op.results[index].state != TaskState::Pending {
                continue;
            }
            let result = &mut op.results[index];
            result.state = TaskState::Running;
            result.started_at = Some(Utc::now());
            let task = op.tasks[index].clone();
            if op.status == OperationStatus::Pending {
                self.set_status(op, OperationStatus::Running);
            }
            debug!(operation_id = %op.operation_id, index, job = %task.job_name, "dispatching task");
            return Some((index, task));
        }
        None
    }

    /// Record the outcome of a trigger. Returns the build to stop when a
    /// remote cancel was requested while the trigger was in flight.
    pub(crate) fn complete(&self, index: usize, outcome: TriggerResult) -> Option<RemoteTarget> {
        let mut guard = self.lock();
        let op = &mut *guard;
        let operation_id = op.operation_id;
        let fail_fast = op.fail_fast;
        let result = &mut op.results[index];
        result.finished_at = Some(Utc::now());
        let mut target = None;
        let mut failed = false;
        match outcome {
            Ok(RetryOutcome { value, attempts }) => {
                result.state = TaskState::Succeeded;
                result.attempts = attempts;
                result.queue_url = Some(value.clone());
                if result.remote_cancel == Some(RemoteCancel::Requested) {
                    target = Some(RemoteTarget {
                        index,
                        job_name: result.job_name.clone(),
                        queue_url: value,
                    });
                }
                debug!(%operation_id, index, job = %result.job_name, attempts, "task succeeded");
            }
            Err(failure) => {
                let attempts = failure.attempts;
                let message = failure.into_app_error().to_string();
                warn!(%operation_id, index, job = %result.job_name, attempts, error = %message, "task failed");
                result.state = TaskState::Failed;
                result.attempts = attempts;
                result.error = Some(message);
                if result.remote_cancel == Some(RemoteCancel::Requested) {
                    result.remote_cancel = Some(RemoteCancel::NotApplicable);
                }
                failed = true;
            }
        }
        if failed && fail_fast {
            skip_pending(op);
        }
        target
    }

    /// Record a task whose worker died without reporting. Counts as a
    /// failure, fail-fast included.
    pub(crate) fn abandon(&self, index: usize, reason: &str) {
        let mut guard = self.lock();
        let op = &mut *guard;
        let result = &mut op.results[index];
        if result.state != TaskState::Running {
            return;
        }
        result.state = TaskState::Failed;
        result.error = Some(reason.to_string());
        result.finished_at = Some(Utc::now());
        if result.remote_cancel == Some(RemoteCancel::Requested) {
            result.remote_cancel = Some(RemoteCancel::NotApplicable);
        }
        if op.fail_fast {
            skip_pending(op);
        }
    }

    pub(crate) fn record_remote_cancel(&self, index: usize, outcome: Result<(), UpstreamError>) {
        let mut op = self.lock();
        let operation_id = op.operation_id;
        let result = &mut op.results[index];
        result.remote_cancel = Some(match outcome {
            Ok(()) => RemoteCancel::Sent,
            Err(err) => {
                warn!(%operation_id, index, job = %result.job_name, error = %err, "remote cancel failed");
                RemoteCancel::Failed {
                    message: err.to_string(),
                }
            }
        });
    }

    /// Stop dispatching and cancel every PENDING task. With
    /// `cancel_running_builds`, RUNNING triggers are flagged and their build
    /// is stopped once the queue URL is known. Finished tasks are left alone.
    ///
    /// `Err` carries the snapshot of an operation that was already terminal.
    pub(crate) fn request_cancel(&self, cancel_running_builds: bool) -> Result<(), BatchOperation> {
        let mut guard = self.lock();
        let op = &mut *guard;
        if op.status.is_terminal() {
            return Err(op.clone());
        }
        op.cancel_requested = true;
        let now = Utc::now();
        let mut flagged = 0;
        for result in op.results.iter_mut() {
            match result.state {
                TaskState::Pending => {
                    result.state = TaskState::Cancelled;
                    result.error = Some(CANCELLED_BEFORE_DISPATCH.to_string());
                    result.finished_at = Some(now);
                }
                TaskState::Running if cancel_running_builds => {
                    result.remote_cancel = Some(RemoteCancel::Requested);
                    flagged += 1;
                }
                _ => {}
            }
        }
        info!(operation_id = %op.operation_id, remote = flagged, "batch cancel requested");
        if op.counts().running == 0 {
            self.set_status(op, OperationStatus::Cancelled);
        }
        Ok(())
    }

    /// Move to the terminal status implied by the task states. Called by the
    /// driver once no task is running; a no-op for terminal operations.
    pub(crate) fn settle(&self) -> OperationStatus {
        let mut guard = self.lock();
        let op = &mut *guard;
        if op.status.is_terminal() {
            return op.status;
        }
        let status = final_status(op);
        self.set_status(op, status);
        let counts = op.counts();
        info!(
            operation_id = %op.operation_id,
            status = ?status,
            succeeded = counts.succeeded,
            failed = counts.failed,
            cancelled = counts.cancelled,
            "batch operation finished"
        );
        status
    }

    pub(crate) async fn wait_terminal(&self) {
        let mut rx = self.status.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx.wait_for(OperationStatus::is_terminal).await;
    }
}

/// Fail-fast: nothing left PENDING will be dispatched.
fn skip_pending(op: &mut BatchOperation) {
    let now = Utc::now();
    let mut skipped = 0;
    for pending in op
        .results
        .iter_mut()
        .filter(|r| r.state == TaskState::Pending)
    {
        pending.state = TaskState::Cancelled;
        pending.error = Some(SKIPPED_AFTER_FAIL_FAST.to_string());
        pending.finished_at = Some(now);
        skipped += 1;
    }
    if skipped > 0 {
        info!(operation_id = %op.operation_id, skipped, "fail-fast: skipping remaining tasks");
    }
}

fn final_status(op: &BatchOperation) -> OperationStatus {
    if op.cancel_requested {
        return OperationStatus::Cancelled;
    }
    let counts = op.counts();
    if op.fail_fast && counts.failed > 0 {
        OperationStatus::Failed
    } else if counts.failed == 0 && counts.cancelled == 0 {
        OperationStatus::Completed
    } else if counts.succeeded == 0 {
        OperationStatus::Failed
    } else {
        OperationStatus::PartiallyFailed
    }
}
