//! Storage contracts consumed by the engine.
//!
//! Adapters live outside the engine (see the `backup-scheduler` SQLite store);
//! [`memory::MemoryStore`] implements every contract in process.

pub mod memory;
pub mod revisions;

use crate::models::{
    Backup, BackupStatus, BackupType, Job, JobPage, JobPatch, JobStatistics, JobStatus,
    MirrorRevision, NewSourceMetadata, SourceMetadata, SourceTrashcan, TrashcanEntry,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use memory::MemoryStore;

pub trait BackupRepository: Send + Sync {
    fn add_backup(&self, backup: &Backup) -> anyhow::Result<Backup>;

    fn get_backup(&self, id: &str) -> anyhow::Result<Option<Backup>>;

    /// Sets the last scheduled time together with the new status, but only
    /// while the stored status is still `expected`. Returns whether the
    /// backup was updated.
    fn update_last_scheduled_time(
        &self,
        id: &str,
        time: DateTime<Utc>,
        expected: BackupStatus,
        status: BackupStatus,
    ) -> anyhow::Result<bool>;

    fn update_last_cleanup_time(&self, id: &str, time: DateTime<Utc>) -> anyhow::Result<()>;

    /// Sets the status. The deletion timestamp is set for `BackupDeleted`
    /// and cleared for every other status.
    fn mark_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()>;

    /// Sets `BackupDeleted` and the deletion timestamp.
    fn mark_deleted(&self, id: &str) -> anyhow::Result<()>;

    /// Backups whose sink data is due for removal.
    fn get_expired(&self, backup_type: BackupType, now: DateTime<Utc>) -> anyhow::Result<Vec<Backup>>;

    /// Live backups that may get new jobs (`NotStarted` or `Prepared`).
    fn get_scheduled(&self, backup_type: BackupType) -> anyhow::Result<Vec<Backup>>;

    fn get_expired_mirror_revisions(
        &self,
        max_revision_lifetime_weeks: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MirrorRevision>>;
}

pub trait JobRepository: Send + Sync {
    fn add_job(&self, job: &Job) -> anyhow::Result<()>;

    /// Persists all jobs or none of them.
    fn add_jobs(&self, jobs: &[Job]) -> anyhow::Result<()>;

    fn get_by_type_and_status(
        &self,
        backup_type: BackupType,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Vec<Job>>;

    /// Live jobs in one of `statuses` not touched since `cutoff`.
    fn get_by_status_and_before(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Job>>;

    fn patch_status(&self, patch: &JobPatch) -> anyhow::Result<()>;

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()>;

    fn get_for_backup(&self, backup_id: &str, page: JobPage) -> anyhow::Result<Vec<Job>>;

    fn get_most_recent_for_backup(
        &self,
        backup_id: &str,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Option<Job>>;

    fn get_statistics_for_backup(&self, backup_id: &str) -> anyhow::Result<JobStatistics>;
}

pub trait SourceMetadataRepository: Send + Sync {
    /// Most recent live row per source of the backup.
    fn get_last_by_backup_id(&self, backup_id: &str) -> anyhow::Result<Vec<SourceMetadata>>;

    /// Appends all rows in one write and returns them, in input order, with
    /// their generated ids.
    fn add(&self, rows: &[NewSourceMetadata]) -> anyhow::Result<Vec<SourceMetadata>>;

    fn mark_deleted(&self, id: i64) -> anyhow::Result<()>;
}

pub trait SourceMetadataJobRepository: Send + Sync {
    fn add(&self, source_metadata_id: i64, job_id: &str) -> anyhow::Result<()>;
}

pub trait SourceTrashcanRepository: Send + Sync {
    fn add(&self, backup_id: &str, source: &str, time: DateTime<Utc>) -> anyhow::Result<()>;

    fn delete(&self, backup_id: &str, source: &str) -> anyhow::Result<()>;

    /// The subset of `entries` that has a trashcan record.
    fn filter_existing(&self, entries: &[TrashcanEntry]) -> anyhow::Result<Vec<TrashcanEntry>>;

    fn get_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<SourceTrashcan>>;
}

/// The full set of stores a processor works against.
#[derive(Clone)]
pub struct Repositories {
    pub backups: Arc<dyn BackupRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub source_metadata: Arc<dyn SourceMetadataRepository>,
    pub source_metadata_jobs: Arc<dyn SourceMetadataJobRepository>,
    pub trashcan: Arc<dyn SourceTrashcanRepository>,
}

impl Repositories {
    /// Use one store that implements every contract.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: BackupRepository
            + JobRepository
            + SourceMetadataRepository
            + SourceMetadataJobRepository
            + SourceTrashcanRepository
            + 'static,
    {
        Self {
            backups: store.clone(),
            jobs: store.clone(),
            source_metadata: store.clone(),
            source_metadata_jobs: store.clone(),
            trashcan: store,
        }
    }
}
