//! herald-cron: one-shot scheduled delivery jobs.
//!
//! Jobs are persisted in a JSON queue file ([`store::JobQueueStore`]) and
//! armed on an in-process timer ([`scheduler::TimerScheduler`]). The queue
//! file is the source of truth; timer registrations are rebuilt from it at
//! startup.

pub mod scheduler;
pub mod store;

use std::fmt;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use herald_types::GroupId;

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Send a markup body, parsed at delivery time.
    #[serde(rename = "sendmessage")]
    SendMessage,
    /// Re-send a stored message verbatim (CQ-code content).
    #[serde(rename = "forwardmessage")]
    ForwardMessage,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendMessage => f.write_str("sendmessage"),
            Self::ForwardMessage => f.write_str("forwardmessage"),
        }
    }
}

/// A persisted one-shot delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Queue key. Not part of the stored value.
    #[serde(skip)]
    pub id: String,
    /// Local wall-clock time the job fires at.
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub content: String,
    pub target_group: GroupId,
}

impl ScheduledJob {
    /// Create a job with its deterministic id.
    pub fn new(
        kind: JobKind,
        content: impl Into<String>,
        target_group: GroupId,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: job_id(kind, timestamp, target_group),
            timestamp,
            kind,
            content: content.into(),
            target_group,
        }
    }

    /// Whether the job is strictly after `now`.
    pub fn is_future(&self, now: NaiveDateTime) -> bool {
        self.timestamp > now
    }
}

/// Seconds since the epoch for a local wall-clock time.
///
/// Times that do not exist locally (DST gaps) are read as UTC.
pub fn local_epoch(at: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&at)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| at.and_utc().timestamp())
}

/// Deterministic job id for a kind, send time and target group.
///
/// Two jobs of the same kind for the same group and second share an id.
pub fn job_id(kind: JobKind, at: NaiveDateTime, target_group: GroupId) -> String {
    let epoch = local_epoch(at);
    match kind {
        JobKind::SendMessage => format!("job_{epoch}_{target_group}"),
        JobKind::ForwardMessage => format!("job_forward_{epoch}_{target_group}"),
    }
}
