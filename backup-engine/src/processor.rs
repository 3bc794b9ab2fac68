//! Entry point used by schedulers and task handlers.
//!
//! Nothing here writes a backup status without going through the lifecycle
//! state machine, and job creation always runs through a [`JobCreator`].

use crate::creator::{BigQueryJobCreator, CloudStorageJobCreator, JobCreator};
use crate::lifecycle;
use crate::models::{
    Backup, BackupStatus, BackupType, ForeignJobId, Job, JobPage, JobPatch, JobStatistics,
    JobStatus, MirrorRevision, SourceTrashcan, TrashcanEntry,
};
use crate::provider::{BigQueryClient, CloudStorageClient, ProviderFactory};
use crate::repository::Repositories;
use crate::utils::{EngineError, ProviderError, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct ScheduleProcessor {
    repositories: Repositories,
}

impl ScheduleProcessor {
    pub fn new(repositories: Repositories) -> Self {
        Self { repositories }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    // Job creators

    pub fn bigquery_job_creator(&self, client: Arc<dyn BigQueryClient>) -> BigQueryJobCreator {
        BigQueryJobCreator::new(self.repositories.clone(), client)
    }

    pub fn cloud_storage_job_creator(
        &self,
        client: Arc<dyn CloudStorageClient>,
    ) -> CloudStorageJobCreator {
        CloudStorageJobCreator::new(self.repositories.clone(), client)
    }

    /// The creator matching the backup's type, with clients built by `providers`.
    pub fn job_creator(
        &self,
        providers: &dyn ProviderFactory,
        backup: &Backup,
    ) -> Result<Box<dyn JobCreator>> {
        let creator: Box<dyn JobCreator> = match backup.backup_type {
            BackupType::BigQuery => {
                let client = providers
                    .bigquery(&backup.source_project, &backup.sink.target_project)
                    .map_err(ProviderError::Other)?;
                Box::new(self.bigquery_job_creator(client))
            }
            BackupType::CloudStorage => {
                let client = providers
                    .cloud_storage(&backup.sink.target_project)
                    .map_err(ProviderError::Other)?;
                Box::new(self.cloud_storage_job_creator(client))
            }
        };
        Ok(creator)
    }

    /// Run one preparation pass for `backup`.
    pub fn prepare_backup(
        &self,
        cancel: &CancellationToken,
        providers: &dyn ProviderFactory,
        backup: &Backup,
    ) -> Result<()> {
        self.job_creator(providers, backup)?.prepare_jobs(cancel, backup)
    }

    // Jobs

    /// Jobs waiting to be handed to the provider.
    pub fn get_next_backup_jobs(&self, backup_type: BackupType) -> Result<Vec<Job>> {
        Ok(self
            .repositories
            .jobs
            .get_by_type_and_status(backup_type, &[JobStatus::NotScheduled])?)
    }

    /// Jobs running at the provider.
    pub fn get_scheduled_backup_jobs(&self, backup_type: BackupType) -> Result<Vec<Job>> {
        Ok(self
            .repositories
            .jobs
            .get_by_type_and_status(backup_type, &[JobStatus::Scheduled, JobStatus::Pending])?)
    }

    /// Jobs in `statuses` that have not changed for `delta_hours`.
    pub fn get_jobs_by_status_older_than(
        &self,
        statuses: &[JobStatus],
        delta_hours: u32,
    ) -> Result<Vec<Job>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(delta_hours));
        Ok(self
            .repositories
            .jobs
            .get_by_status_and_before(statuses, cutoff)?)
    }

    pub fn get_jobs_for_backup(&self, backup_id: &str, page: JobPage) -> Result<Vec<Job>> {
        Ok(self.repositories.jobs.get_for_backup(backup_id, page)?)
    }

    pub fn get_job_statistics(&self, backup_id: &str) -> Result<JobStatistics> {
        Ok(self.repositories.jobs.get_statistics_for_backup(backup_id)?)
    }

    /// Record a job status reported by the provider. `external_id` is the
    /// extract job id for BigQuery and the transfer job id for Cloud Storage.
    pub fn update_job(
        &self,
        backup_type: BackupType,
        job_id: &str,
        status: JobStatus,
        external_id: &str,
    ) -> Result<()> {
        let external_id = Some(external_id.to_string());
        let foreign_job_id = match backup_type {
            BackupType::BigQuery => ForeignJobId {
                bigquery_extract_job_id: external_id,
                cloudstorage_transfer_job_id: None,
            },
            BackupType::CloudStorage => ForeignJobId {
                bigquery_extract_job_id: None,
                cloudstorage_transfer_job_id: external_id,
            },
        };
        self.repositories.jobs.patch_status(&JobPatch {
            id: job_id.to_string(),
            status,
            foreign_job_id,
        })?;
        Ok(())
    }

    pub fn mark_job_deleted(&self, job_id: &str) -> Result<()> {
        Ok(self.repositories.jobs.mark_deleted(job_id)?)
    }

    // Backups

    pub fn get_backup(&self, backup_id: &str) -> Result<Backup> {
        self.repositories
            .backups
            .get_backup(backup_id)?
            .ok_or_else(|| EngineError::BackupNotFound(backup_id.to_string()))
    }

    pub fn get_scheduled_backups(&self, backup_type: BackupType) -> Result<Vec<Backup>> {
        Ok(self.repositories.backups.get_scheduled(backup_type)?)
    }

    pub fn get_expired_backups(&self, backup_type: BackupType) -> Result<Vec<Backup>> {
        Ok(self
            .repositories
            .backups
            .get_expired(backup_type, Utc::now())?)
    }

    pub fn get_expired_mirror_revisions(
        &self,
        max_revision_lifetime_weeks: u32,
    ) -> Result<Vec<MirrorRevision>> {
        Ok(self
            .repositories
            .backups
            .get_expired_mirror_revisions(max_revision_lifetime_weeks, Utc::now())?)
    }

    /// Move a backup to `status` if the lifecycle allows it.
    pub fn update_backup_status(&self, backup_id: &str, status: BackupStatus) -> Result<BackupStatus> {
        let backup = self.get_backup(backup_id)?;
        let next = lifecycle::transition(backup.status, status)?;
        self.apply_status(&backup, next)?;
        Ok(next)
    }

    /// Ask for a backup to be removed. Backups that never ran are deleted
    /// right away, the others wait for their sink data to be cleaned up.
    pub fn request_deletion(&self, backup_id: &str) -> Result<BackupStatus> {
        let backup = self.get_backup(backup_id)?;
        let next = lifecycle::deletion_target(backup.status)?;
        self.apply_status(&backup, next)?;
        Ok(next)
    }

    /// Final step of the deletion, once the sink data is gone.
    pub fn mark_backup_deleted(&self, backup_id: &str) -> Result<()> {
        self.update_backup_status(backup_id, BackupStatus::BackupDeleted)
            .map(|_| ())
    }

    pub fn update_last_cleanup_time(&self, backup_id: &str, time: DateTime<Utc>) -> Result<()> {
        Ok(self
            .repositories
            .backups
            .update_last_cleanup_time(backup_id, time)?)
    }

    fn apply_status(&self, backup: &Backup, status: BackupStatus) -> Result<()> {
        if status == BackupStatus::BackupDeleted {
            self.repositories.backups.mark_deleted(&backup.id)?;
        } else {
            self.repositories.backups.mark_status(&backup.id, status)?;
        }
        info!(backup_id = %backup.id, from = %backup.status, to = %status, "backup status changed");
        Ok(())
    }

    // Source metadata

    pub fn mark_source_metadata_deleted(&self, source_metadata_id: i64) -> Result<()> {
        Ok(self
            .repositories
            .source_metadata
            .mark_deleted(source_metadata_id)?)
    }

    // Trashcan

    pub fn add_trashcan_entry(
        &self,
        backup_id: &str,
        source: &str,
        time: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self.repositories.trashcan.add(backup_id, source, time)?)
    }

    pub fn delete_trashcan_entry(&self, backup_id: &str, source: &str) -> Result<()> {
        Ok(self.repositories.trashcan.delete(backup_id, source)?)
    }

    pub fn filter_existing_trashcan_entries(
        &self,
        entries: &[TrashcanEntry],
    ) -> Result<Vec<TrashcanEntry>> {
        Ok(self.repositories.trashcan.filter_existing(entries)?)
    }

    /// Entries that have been in the trashcan for more than `delta_weeks`.
    pub fn get_trashcan_entries_before(&self, delta_weeks: u32) -> Result<Vec<SourceTrashcan>> {
        let cutoff = Utc::now() - Duration::weeks(i64::from(delta_weeks));
        Ok(self.repositories.trashcan.get_before(cutoff)?)
    }
}
