//! One-shot timer scheduler: fires each registered job once at its time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::ScheduledJob;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("conflicting job id: {0} is already scheduled")]
    Conflict(String),
    #[error("no job by the id of {0} was found")]
    NotFound(String),
}

/// Arms and disarms one-shot job timers keyed by job id.
///
/// Registrations carry no durable state; the queue file is authoritative.
pub trait Scheduler: Send + Sync {
    /// Arm `job` to fire at `job.timestamp`. Past times fire immediately.
    fn register(&self, job: ScheduledJob) -> Result<(), SchedulerError>;

    /// Disarm a pending job.
    fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;

    /// Whether a job is currently armed.
    fn is_registered(&self, job_id: &str) -> bool;
}

type Handles = Arc<Mutex<HashMap<String, AbortHandle>>>;

fn lock(handles: &Handles) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
    handles.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tokio-backed scheduler. Fired jobs are delivered on the channel returned
/// by [`TimerScheduler::new`].
///
/// Must be used from within a tokio runtime.
pub struct TimerScheduler {
    handles: Handles,
    fired_tx: mpsc::UnboundedSender<ScheduledJob>,
}

impl TimerScheduler {
    /// Create a scheduler and the receiver its fired jobs arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledJob>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Number of armed jobs.
    pub fn pending(&self) -> usize {
        lock(&self.handles).len()
    }
}

impl Scheduler for TimerScheduler {
    fn register(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        let mut handles = lock(&self.handles);
        if handles.contains_key(&job.id) {
            return Err(SchedulerError::Conflict(job.id));
        }

        let delay = (job.timestamp - Local::now().naive_local())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let job_id = job.id.clone();
        let task_handles = self.handles.clone();
        let fired_tx = self.fired_tx.clone();

        debug!(job_id = %job_id, delay_secs = delay.as_secs(), "Arming job timer");

        // The map lock is held until the handle is inserted, so the task
        // cannot remove its entry before it exists.
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&task_handles).remove(&job.id);
            info!(job_id = %job.id, "Job timer fired");
            if let Err(e) = fired_tx.send(job) {
                warn!(job_id = %e.0.id, "Fired job dropped, receiver closed");
            }
        });
        handles.insert(job_id, task.abort_handle());
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        match lock(&self.handles).remove(job_id) {
            Some(handle) => {
                handle.abort();
                debug!(job_id, "Job timer cancelled");
                Ok(())
            }
            None => Err(SchedulerError::NotFound(job_id.to_string())),
        }
    }

    fn is_registered(&self, job_id: &str) -> bool {
        lock(&self.handles).contains_key(job_id)
    }
}
