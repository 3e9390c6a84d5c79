use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::delivery::{DeliveryAdapter, Payload, SentMessage};

use super::recurrence::{after_delivery, RecurrenceDecision};
use super::store::SqliteTaskStore;
use super::types::{SchedulerError, Task, TaskStatus};

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub claimed: usize,
    /// Due tasks another cycle or process claimed (or removed) first.
    pub claim_conflicts: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub deleted: usize,
    /// Returned to `pending` for a later cycle.
    pub deferred: usize,
    /// Moved to `error`, or left untouched after a store failure.
    pub failed: usize,
    /// Completed without calling the adapter because there was nothing to send.
    pub empty_payloads: usize,
    /// Stale `processing` claims returned to `pending` before loading due tasks.
    pub requeued: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still running.
    Skipped,
    Completed(CycleReport),
}

enum TaskOutcome {
    ClaimConflict,
    Completed { completion: Completion, sent: bool },
    Deferred,
    Failed,
}

enum Completion {
    Rescheduled,
    Deleted,
    Retired,
    Failed,
}

/// Polls the task store and delivers due tasks through a [`DeliveryAdapter`].
///
/// The only state kept between cycles is the run-guard flag; every task read goes to the
/// store. Independent instances may share one database file.
pub struct Scheduler<D: DeliveryAdapter + ?Sized> {
    store: SqliteTaskStore,
    delivery: Arc<D>,
    running: AtomicBool,
    max_send_attempts: Option<u32>,
    stale_claim_after: Option<Duration>,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<D: DeliveryAdapter + ?Sized> Scheduler<D> {
    pub fn new(store: SqliteTaskStore, delivery: Arc<D>) -> Self {
        Self {
            store,
            delivery,
            running: AtomicBool::new(false),
            max_send_attempts: None,
            stale_claim_after: None,
        }
    }

    /// Caps consecutive failed sends; the task moves to `error` on the last one.
    /// `None` retries forever.
    pub fn with_max_send_attempts(mut self, max_send_attempts: Option<u32>) -> Self {
        self.max_send_attempts = max_send_attempts.filter(|value| *value > 0);
        self
    }

    /// Each cycle first returns `processing` claims untouched for longer than `after`
    /// to `pending`, recovering tasks whose claiming process died mid-delivery.
    pub fn with_stale_claim_recovery(mut self, after: Option<Duration>) -> Self {
        self.stale_claim_after = after;
        self
    }

    pub fn store(&self) -> &SqliteTaskStore {
        &self.store
    }

    pub fn delivery(&self) -> &Arc<D> {
        &self.delivery
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_enter(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Runs one poll cycle. Never fails: per-task errors end up in the task status and
    /// the log.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = self.try_enter() else {
            debug!("previous scheduler cycle still running; skipping");
            return CycleOutcome::Skipped;
        };

        let mut report = CycleReport {
            requeued: self.requeue_stale_claims(),
            ..CycleReport::default()
        };
        let due = match self.store.list_due(Utc::now()) {
            Ok(tasks) => tasks,
            Err(err) => {
                error!("scheduler failed to load due tasks: {}", err);
                return CycleOutcome::Completed(report);
            }
        };
        report.due = due.len();

        for task in &due {
            match self.process_task(task.id).await {
                TaskOutcome::ClaimConflict => report.claim_conflicts += 1,
                TaskOutcome::Completed { completion, sent } => {
                    report.claimed += 1;
                    if sent {
                        report.delivered += 1;
                    } else {
                        report.empty_payloads += 1;
                    }
                    match completion {
                        Completion::Rescheduled => report.rescheduled += 1,
                        Completion::Deleted => report.deleted += 1,
                        Completion::Retired => {}
                        Completion::Failed => report.failed += 1,
                    }
                }
                TaskOutcome::Deferred => {
                    report.claimed += 1;
                    report.deferred += 1;
                }
                TaskOutcome::Failed => report.failed += 1,
            }
        }

        CycleOutcome::Completed(report)
    }

    fn requeue_stale_claims(&self) -> usize {
        let Some(after) = self.stale_claim_after else {
            return 0;
        };
        let Ok(age) = chrono::Duration::from_std(after) else {
            return 0;
        };
        match self.store.requeue_stale_claims(Utc::now() - age) {
            Ok(0) => 0,
            Ok(count) => {
                warn!("returned {} interrupted task(s) to pending", count);
                count
            }
            Err(err) => {
                error!("failed to recover interrupted tasks: {}", err);
                0
            }
        }
    }

    async fn process_task(&self, task_id: Uuid) -> TaskOutcome {
        match self.store.claim(task_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("task {} already claimed elsewhere", task_id);
                return TaskOutcome::ClaimConflict;
            }
            Err(err) => {
                error!("failed to claim task {}: {}", task_id, err);
                return TaskOutcome::Failed;
            }
        }

        // Re-read after the claim so edits made since list_due are honoured.
        let task = match self.store.get(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                info!("task {} was cancelled while being claimed", task_id);
                return TaskOutcome::ClaimConflict;
            }
            Err(err) => {
                error!("failed to reload claimed task {}: {}", task_id, err);
                self.mark(task_id, TaskStatus::Pending);
                return TaskOutcome::Deferred;
            }
        };

        let channel = match self.delivery.resolve_channel(&task.channel_id).await {
            Ok(channel) => channel,
            Err(err) if err.is_permanent() => {
                warn!("task {}: {}; marking as error", task.id, err);
                self.mark(task.id, TaskStatus::Error);
                return TaskOutcome::Failed;
            }
            Err(err) => {
                warn!("task {}: channel not resolvable yet ({}); will retry", task.id, err);
                self.mark(task.id, TaskStatus::Pending);
                return TaskOutcome::Deferred;
            }
        };

        let payload = Payload::from_task(&task);
        if payload.is_empty() {
            warn!(
                "task {} has neither text nor attachment; completing without sending",
                task.id
            );
            return TaskOutcome::Completed {
                completion: self.complete(&task),
                sent: false,
            };
        }

        match self.delivery.send(&channel, &payload).await {
            Ok(sent) => {
                info!(
                    "task {} delivered to channel {} (message {})",
                    task.id, task.channel_id, sent.message_id
                );
                TaskOutcome::Completed {
                    completion: self.complete(&task),
                    sent: true,
                }
            }
            Err(err) if err.is_permanent() => {
                warn!("task {}: {}; marking as error", task.id, err);
                self.mark(task.id, TaskStatus::Error);
                TaskOutcome::Failed
            }
            Err(err) => self.handle_send_failure(&task, &err.to_string()),
        }
    }

    fn handle_send_failure(&self, task: &Task, reason: &str) -> TaskOutcome {
        let attempts = match self.store.record_send_failure(task.id) {
            Ok(attempts) => Some(attempts),
            Err(err) => {
                error!("failed to record send failure for task {}: {}", task.id, err);
                None
            }
        };

        if let (Some(max), Some(attempts)) = (self.max_send_attempts, attempts) {
            if attempts >= max {
                warn!(
                    "task {} failed {} times (last: {}); marking as error",
                    task.id, attempts, reason
                );
                self.mark(task.id, TaskStatus::Error);
                return TaskOutcome::Failed;
            }
        }

        warn!("task {} send failed: {}; will retry next cycle", task.id, reason);
        self.mark(task.id, TaskStatus::Pending);
        TaskOutcome::Deferred
    }

    fn complete(&self, task: &Task) -> Completion {
        match after_delivery(task) {
            RecurrenceDecision::Reschedule(next) => {
                if let Err(err) = self.store.reschedule(task.id, next) {
                    // Leaving it pending at the old time would send it again.
                    error!("failed to reschedule task {}: {}", task.id, err);
                    self.mark(task.id, TaskStatus::Error);
                    return Completion::Failed;
                }
                self.mark(task.id, TaskStatus::Pending);
                info!("task {} rescheduled for {}", task.id, next.to_rfc3339());
                Completion::Rescheduled
            }
            RecurrenceDecision::Retire => {
                warn!("task {} cannot advance another year; marking as sent", task.id);
                self.mark(task.id, TaskStatus::Sent);
                Completion::Retired
            }
            RecurrenceDecision::Complete => {
                if let Some(path) = task.attachment_path.as_deref() {
                    remove_attachment(path);
                }
                match self.store.delete(task.id) {
                    Ok(()) | Err(SchedulerError::TaskNotFound(_)) => Completion::Deleted,
                    Err(err) => {
                        error!("failed to delete completed task {}: {}", task.id, err);
                        self.mark(task.id, TaskStatus::Error);
                        Completion::Failed
                    }
                }
            }
        }
    }

    fn mark(&self, task_id: Uuid, status: TaskStatus) {
        match self.store.set_status(task_id, status) {
            Ok(()) => {}
            Err(SchedulerError::TaskNotFound(_)) => {
                debug!("task {} removed before status {} could be set", task_id, status);
            }
            Err(err) => error!("failed to set task {} to {}: {}", task_id, status, err),
        }
    }

    /// Delivers `payload` right away, bypassing the store.
    pub async fn send_now(
        &self,
        channel_id: &str,
        payload: Payload,
    ) -> Result<SentMessage, SchedulerError> {
        if payload.is_empty() {
            return Err(SchedulerError::EmptyPayload);
        }
        let channel = self.delivery.resolve_channel(channel_id).await?;
        let sent = self.delivery.send(&channel, &payload).await?;
        info!(
            "immediate message delivered to channel {} (message {})",
            channel_id, sent.message_id
        );
        Ok(sent)
    }
}

impl<D: DeliveryAdapter + ?Sized + 'static> Scheduler<D> {
    /// Ticks every `poll_interval` until `shutdown` turns true. Each cycle runs on its own
    /// task, so a slow cycle makes later ticks skip instead of piling up. A cycle that is
    /// running when shutdown arrives is awaited before this returns.
    pub async fn run_loop(self: Arc<Self>, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("scheduler loop started (every {:?})", poll_interval);

        let mut in_flight: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|cycle| !cycle.is_finished()) {
                        debug!("previous scheduler cycle still running; skipping tick");
                        continue;
                    }
                    let scheduler = self.clone();
                    in_flight = Some(tokio::spawn(async move {
                        if let CycleOutcome::Completed(report) = scheduler.run_cycle().await {
                            if report.due > 0 || report.requeued > 0 {
                                info!("scheduler cycle finished: {:?}", report);
                            }
                        }
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(cycle) = in_flight {
            if !cycle.is_finished() {
                info!("waiting for the running scheduler cycle to finish");
            }
            if let Err(err) = cycle.await {
                error!("scheduler cycle task failed: {}", err);
            }
        }
        info!("scheduler loop stopped");
    }
}

/// Best-effort removal of a delivered attachment.
pub(crate) fn remove_attachment(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed attachment {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("attachment {} already gone", path.display());
        }
        Err(err) => warn!("failed to remove attachment {}: {}", path.display(), err),
    }
}
