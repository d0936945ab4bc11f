//! In-memory transport and scheduler doubles for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use herald_cron::ScheduledJob;
use herald_cron::scheduler::{Scheduler, SchedulerError};
use herald_types::{GroupId, MessageId, MessageSegment};

use crate::transport::MessageTransport;

/// Records successful sends and deletes; selected ids can be made to fail.
pub struct MockTransport {
    next_id: AtomicI64,
    sent: Mutex<Vec<(GroupId, Vec<MessageSegment>)>>,
    deleted: Mutex<Vec<MessageId>>,
    failing_groups: Mutex<HashSet<GroupId>>,
    failing_deletes: Mutex<HashSet<MessageId>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            failing_groups: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }
}

impl MockTransport {
    pub fn sent(&self) -> Vec<(GroupId, Vec<MessageSegment>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn fail_group(&self, group_id: GroupId) {
        self.failing_groups.lock().unwrap().insert(group_id);
    }

    pub fn fail_delete(&self, message_id: MessageId) {
        self.failing_deletes.lock().unwrap().insert(message_id);
    }
}

#[async_trait::async_trait]
impl MessageTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_group_message(
        &self,
        group_id: GroupId,
        segments: Vec<MessageSegment>,
    ) -> anyhow::Result<MessageId> {
        if self.failing_groups.lock().unwrap().contains(&group_id) {
            anyhow::bail!("group {group_id} unreachable");
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((group_id, segments));
        Ok(id)
    }

    async fn delete_message(&self, message_id: MessageId) -> anyhow::Result<()> {
        if self.failing_deletes.lock().unwrap().contains(&message_id) {
            anyhow::bail!("message {message_id} cannot be recalled");
        }
        self.deleted.lock().unwrap().push(message_id);
        Ok(())
    }
}

/// Tracks registrations without arming any timers.
#[derive(Default)]
pub struct MockScheduler {
    registered: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockScheduler {
    pub fn registered_ids(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    /// Every cancel attempt, found or not.
    pub fn cancelled_ids(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Scheduler for MockScheduler {
    fn register(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        let mut registered = self.registered.lock().unwrap();
        if registered.contains(&job.id) {
            return Err(SchedulerError::Conflict(job.id));
        }
        registered.push(job.id);
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        let mut registered = self.registered.lock().unwrap();
        match registered.iter().position(|id| id == job_id) {
            Some(pos) => {
                registered.remove(pos);
                Ok(())
            }
            None => Err(SchedulerError::NotFound(job_id.to_string())),
        }
    }

    fn is_registered(&self, job_id: &str) -> bool {
        self.registered.lock().unwrap().iter().any(|id| id == job_id)
    }
}
