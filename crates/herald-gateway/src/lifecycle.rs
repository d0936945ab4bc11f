//! Scheduled-task lifecycle: create, reconcile, execute, cancel, list.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use herald_command::{cq, markup};
use herald_cron::scheduler::{Scheduler, SchedulerError};
use herald_cron::store::{JobQueueStore, StoreError};
use herald_cron::{JobKind, ScheduledJob};
use herald_types::{GroupId, MessageId, MessageSegment};

use crate::transport::MessageTransport;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid content filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

/// Conjunctive filters for [`TaskLifecycleManager::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact send time.
    pub timestamp: Option<NaiveDateTime>,
    /// Regex searched (not fully matched) against the job content.
    pub content: Option<String>,
    /// Exact target group.
    pub target_group: Option<GroupId>,
}

/// What a cancellation actually touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOutcome {
    /// A live timer was disarmed.
    pub disarmed: bool,
    /// A queue entry was removed.
    pub removed: bool,
}

impl CancelOutcome {
    pub fn found(&self) -> bool {
        self.disarmed || self.removed
    }
}

/// Apply `filter` to `jobs`, keeping their order.
pub fn filter_jobs(
    jobs: Vec<ScheduledJob>,
    filter: &ListFilter,
) -> Result<Vec<ScheduledJob>, LifecycleError> {
    let content_re = filter.content.as_deref().map(Regex::new).transpose()?;

    Ok(jobs
        .into_iter()
        .filter(|j| filter.timestamp.is_none_or(|ts| j.timestamp == ts))
        .filter(|j| content_re.as_ref().is_none_or(|re| re.is_match(&j.content)))
        .filter(|j| filter.target_group.is_none_or(|g| j.target_group == g))
        .collect())
}

/// Build the outbound payload for a job.
pub fn job_payload(job: &ScheduledJob) -> Vec<MessageSegment> {
    match job.kind {
        JobKind::SendMessage => markup::parse_content(&job.content),
        JobKind::ForwardMessage => cq::decode(&job.content),
    }
}

/// Orchestrates the job queue, the scheduler and the transport.
pub struct TaskLifecycleManager {
    store: Arc<JobQueueStore>,
    scheduler: Arc<dyn Scheduler>,
    transport: Arc<dyn MessageTransport>,
    admin_groups: Vec<GroupId>,
    /// Serializes the conflict check, upsert and registration of `schedule`.
    schedule_lock: Mutex<()>,
}

impl TaskLifecycleManager {
    pub fn new(
        store: Arc<JobQueueStore>,
        scheduler: Arc<dyn Scheduler>,
        transport: Arc<dyn MessageTransport>,
        admin_groups: Vec<GroupId>,
    ) -> Self {
        Self {
            store,
            scheduler,
            transport,
            admin_groups,
            schedule_lock: Mutex::new(()),
        }
    }

    /// Re-arm every persisted job that is still in the future.
    ///
    /// Past-due jobs stay in the queue but are never fired late.
    pub fn reconcile_on_startup(&self) -> usize {
        let now = Local::now().naive_local();
        let mut armed = 0;

        for job in self.store.load_all() {
            if !job.is_future(now) {
                info!(job_id = %job.id, "Skipping past-due job");
                continue;
            }
            let job_id = job.id.clone();
            match self.scheduler.register(job) {
                Ok(()) => {
                    info!(job_id = %job_id, "Loaded scheduled job");
                    armed += 1;
                }
                Err(e) => warn!(job_id = %job_id, "Failed to re-arm job: {e}"),
            }
        }

        info!(armed, "Job queue reconciled");
        armed
    }

    /// Create a job: persist it, then arm it. Returns the job id.
    ///
    /// A send time in the past is accepted and fires right away. An id that
    /// is already armed is rejected without touching the queue.
    pub fn schedule(
        &self,
        kind: JobKind,
        content: impl Into<String>,
        target_group: GroupId,
        send_time: NaiveDateTime,
    ) -> Result<String, LifecycleError> {
        let job = ScheduledJob::new(kind, content, target_group, send_time);
        let job_id = job.id.clone();

        let _guard = self
            .schedule_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.scheduler.is_registered(&job_id) {
            return Err(SchedulerError::Conflict(job_id).into());
        }
        // Persist before arming: a past-due job may fire as soon as it is
        // registered, and execution reads the queue.
        self.store.upsert(&job)?;
        self.scheduler.register(job)?;

        info!(job_id = %job_id, %kind, target_group, %send_time, "Job scheduled");
        Ok(job_id)
    }

    /// Deliver a fired job and drop it from the queue.
    ///
    /// The stored record is authoritative: a job missing from the queue is
    /// not delivered. Delivery failure is terminal; the job is removed
    /// either way.
    pub async fn execute(&self, fired: ScheduledJob) -> Option<MessageId> {
        let Some(job) = self.store.get(&fired.id) else {
            warn!(job_id = %fired.id, "Fired job is no longer queued, skipping");
            return None;
        };

        let delivered = self.deliver(&job).await;

        if let Err(e) = self.store.remove(&job.id) {
            error!(job_id = %job.id, "Failed to remove executed job: {e}");
        }
        delivered
    }

    async fn deliver(&self, job: &ScheduledJob) -> Option<MessageId> {
        let payload = job_payload(job);
        if payload.is_empty() {
            warn!(job_id = %job.id, "Job has empty content, nothing sent");
            return None;
        }

        let message_id = match self
            .transport
            .send_group_message(job.target_group, payload)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(job_id = %job.id, "Failed to execute scheduled job: {e:#}");
                return None;
            }
        };

        info!(
            job_id = %job.id,
            target_group = job.target_group,
            message_id,
            "Executed scheduled job"
        );

        let notice = format!(
            "Scheduled message sent to group {}.\nMessageID: {message_id}",
            job.target_group
        );
        for &admin_group in &self.admin_groups {
            if let Err(e) = self
                .transport
                .send_group_message(admin_group, vec![MessageSegment::text(notice.clone())])
                .await
            {
                warn!(admin_group, "Failed to send confirmation to admin group: {e:#}");
            }
        }

        Some(message_id)
    }

    /// Cancel a job. A missing timer does not stop queue removal.
    pub fn cancel(&self, job_id: &str) -> Result<CancelOutcome, LifecycleError> {
        let disarmed = match self.scheduler.cancel(job_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id, "No live timer to cancel: {e}");
                false
            }
        };
        let removed = self.store.remove(job_id)?;

        info!(job_id, disarmed, removed, "Job cancelled");
        Ok(CancelOutcome { disarmed, removed })
    }

    /// Every queued job, in queue order.
    pub fn jobs(&self) -> Vec<ScheduledJob> {
        self.store.load_all()
    }

    /// Queued jobs matching `filter`.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<ScheduledJob>, LifecycleError> {
        filter_jobs(self.jobs(), filter)
    }

    /// Consume fired jobs and execute each on its own task.
    pub async fn run(self: Arc<Self>, mut fired: mpsc::UnboundedReceiver<ScheduledJob>) {
        info!("Job executor started");
        while let Some(job) = fired.recv().await {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.execute(job).await;
            });
        }
        info!("Job executor stopped");
    }
}
