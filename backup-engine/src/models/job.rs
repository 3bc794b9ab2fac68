use super::{BackupType, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Handle of the provider job doing the actual copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignJobId {
    pub bigquery_extract_job_id: Option<String>,
    pub cloudstorage_transfer_job_id: Option<String>,
}

/// A unit of backup work for one source (table, partition or bucket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub backup_id: String,
    pub job_type: BackupType,
    pub status: JobStatus,
    pub source: String,
    pub foreign_job_id: ForeignJobId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(backup_id: &str, source: &str, job_type: BackupType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            backup_id: backup_id.to_string(),
            job_type,
            status: JobStatus::NotScheduled,
            source: source.to_string(),
            foreign_job_id: ForeignJobId::default(),
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backupID={} jobID={} type={} status={} source={}",
            self.backup_id, self.id, self.job_type, self.status, self.source
        )
    }
}

/// Status change reported by the job status poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPatch {
    pub id: String,
    pub status: JobStatus,
    pub foreign_job_id: ForeignJobId,
}

/// Page of jobs, newest first. `size: None` fetches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobPage {
    pub size: Option<usize>,
    pub number: usize,
}

impl JobPage {
    pub fn all() -> Self {
        Self::default()
    }

    pub(crate) fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.size {
            Some(size) => items
                .into_iter()
                .skip(self.number.saturating_mul(size))
                .take(size)
                .collect(),
            None => items,
        }
    }
}
