//! JSON-file job queue.
//!
//! The file holds a single object keyed by job id. Every mutation re-reads
//! the whole file, applies the change and writes the whole file back, all
//! under one lock. Unreadable content is treated as an empty queue.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ScheduledJob;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on queue file: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent storage for scheduled jobs.
pub struct JobQueueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JobQueueStore {
    /// Open or create a queue file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.is_file() {
            std::fs::write(path, "{}")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the raw queue object. Missing or malformed content yields an
    /// empty object.
    fn read_raw(&self) -> Map<String, Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), "Failed to read queue file: {e}");
                }
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    path = %self.path.display(),
                    "Queue file does not contain an object, treating as empty"
                );
                Map::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    "Failed to decode queue file, treating as empty: {e}"
                );
                Map::new()
            }
        }
    }

    fn write_raw(&self, map: &Map<String, Value>) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        map.serialize(&mut ser)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &buf)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), jobs = map.len(), "Queue file written");
        Ok(())
    }

    fn decode_entry(id: &str, value: &Value) -> Option<ScheduledJob> {
        match serde_json::from_value::<ScheduledJob>(value.clone()) {
            Ok(mut job) => {
                job.id = id.to_string();
                Some(job)
            }
            Err(e) => {
                warn!(job_id = %id, "Skipping malformed queue entry: {e}");
                None
            }
        }
    }

    /// Load every decodable job, in file order.
    pub fn load_all(&self) -> Vec<ScheduledJob> {
        let _guard = self.guard();
        self.read_raw()
            .iter()
            .filter_map(|(id, value)| Self::decode_entry(id, value))
            .collect()
    }

    /// Look up a single job.
    pub fn get(&self, id: &str) -> Option<ScheduledJob> {
        let _guard = self.guard();
        self.read_raw()
            .get(id)
            .and_then(|value| Self::decode_entry(id, value))
    }

    /// Insert or replace the job stored under `job.id`.
    pub fn upsert(&self, job: &ScheduledJob) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_raw();
        map.insert(job.id.clone(), serde_json::to_value(job)?);
        self.write_raw(&map)
    }

    /// Remove a job. Returns whether it was present; removing an absent id
    /// leaves the file untouched.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.guard();
        let mut map = self.read_raw();
        if map.shift_remove(id).is_none() {
            return Ok(false);
        }
        self.write_raw(&map)?;
        Ok(true)
    }
}
