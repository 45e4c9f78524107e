//! Batch job and upload session bookkeeping

use crate::{CoreError, ErrorKind, Result};
use boxgate_driver::Entry;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

/// Progress of a batch job
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    /// One entry per batch item, in request order
    Complete { entries: Vec<Entry> },
    Failed { summary: String, kind: ErrorKind },
}

#[derive(Clone, Debug)]
struct JobRecord {
    owner: String,
    status: JobStatus,
    updated_at: DateTime<Utc>,
}

/// Batch jobs by id
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<String, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job as in progress and return its id
    pub fn create(&self, owner: &str) -> String {
        let id = format!("dbjid:{}", uuid::Uuid::new_v4().simple());
        self.jobs.insert(
            id.clone(),
            JobRecord {
                owner: owner.to_string(),
                status: JobStatus::InProgress,
                updated_at: Utc::now(),
            },
        );
        id
    }

    pub fn set(&self, id: &str, status: JobStatus) {
        if let Some(mut record) = self.jobs.get_mut(id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }

    pub fn remove(&self, id: &str) {
        self.jobs.remove(id);
    }

    /// Status of a job owned by `owner`
    pub fn status(&self, owner: &str, id: &str) -> Result<JobStatus> {
        match self.jobs.get(id) {
            Some(record) if record.owner == owner => Ok(record.status.clone()),
            _ => Err(CoreError::JobNotFound(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop finished jobs not touched within `max_age`
    pub fn cleanup_expired(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        let before = self.jobs.len();
        self.jobs.retain(|_, record| {
            matches!(record.status, JobStatus::InProgress) || record.updated_at > cutoff
        });
        debug!(removed = before.saturating_sub(self.jobs.len()), "Expired jobs cleaned up");
    }
}

/// Owners of open upload sessions
#[derive(Debug, Default)]
pub struct UploadSessions {
    sessions: DashMap<String, UploadSession>,
}

#[derive(Clone, Debug)]
struct UploadSession {
    owner: String,
    opened: DateTime<Utc>,
    /// End of the furthest byte received so far
    length: u64,
}

impl UploadSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, session_id: &str, owner: &str) {
        self.sessions.insert(
            session_id.to_string(),
            UploadSession {
                owner: owner.to_string(),
                opened: Utc::now(),
                length: 0,
            },
        );
    }

    /// Fails unless the session exists and belongs to `owner`
    pub fn check(&self, session_id: &str, owner: &str) -> Result<()> {
        match self.sessions.get(session_id) {
            Some(session) if session.owner == owner => Ok(()),
            _ => Err(CoreError::UploadSessionNotFound(session_id.to_string())),
        }
    }

    /// Record that bytes up to `end` have been stored
    pub fn extend(&self, session_id: &str, end: u64) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.length = session.length.max(end);
        }
    }

    /// Forget a session, returning the number of bytes it received
    pub fn close(&self, session_id: &str) -> Option<u64> {
        self.sessions
            .remove(session_id)
            .map(|(_, session)| session.length)
    }

    /// Forget sessions opened more than `max_age` ago; returns their ids so
    /// their segments can be removed
    pub fn expire(&self, max_age: Duration) -> Vec<String> {
        let cutoff = Utc::now() - max_age;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.value().opened <= cutoff)
            .map(|s| s.key().clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }
}
