use super::{mark_prepared, validate, JobCreator};
use crate::enumerator::enumerate_bucket;
use crate::models::{Backup, BackupType, ForeignJobId, Job, JobStatus, Strategy};
use crate::provider::CloudStorageClient;
use crate::repository::Repositories;
use crate::utils::{ensure_active, EngineError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Creates one transfer job per pass for the whole bucket. Object level
/// change detection is left to the transfer service.
pub struct CloudStorageJobCreator {
    repositories: Repositories,
    client: Arc<dyn CloudStorageClient>,
}

impl CloudStorageJobCreator {
    pub fn new(repositories: Repositories, client: Arc<dyn CloudStorageClient>) -> Self {
        Self {
            repositories,
            client,
        }
    }

    fn ensure_bucket(&self, backup: &Backup) -> Result<()> {
        let bucket = &backup.cloud_storage.bucket;
        match self.client.does_bucket_exist(&backup.source_project, bucket) {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::BucketNotFound(bucket.clone())),
            Err(e) if e.is_not_found() => Err(EngineError::BucketNotFound(bucket.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshots keep using the transfer job of their latest finished run.
    fn reusable_transfer(&self, backup: &Backup) -> Result<ForeignJobId> {
        if backup.strategy != Strategy::Snapshot {
            return Ok(ForeignJobId::default());
        }
        let recent = self.repositories.jobs.get_most_recent_for_backup(
            &backup.id,
            &[JobStatus::FinishedOk, JobStatus::FinishedError],
        )?;
        Ok(ForeignJobId {
            bigquery_extract_job_id: None,
            cloudstorage_transfer_job_id: recent
                .and_then(|job| job.foreign_job_id.cloudstorage_transfer_job_id),
        })
    }
}

impl JobCreator for CloudStorageJobCreator {
    fn prepare_jobs(&self, cancel: &CancellationToken, backup: &Backup) -> Result<()> {
        let next_status = validate(backup)?;
        ensure_active(cancel)?;
        self.ensure_bucket(backup)?;

        ensure_active(cancel)?;
        let foreign_job_id = self.reusable_transfer(backup)?;
        let jobs: Vec<Job> = enumerate_bucket(backup)
            .iter()
            .map(|r| {
                let mut job = Job::new(&backup.id, &r.name, BackupType::CloudStorage);
                job.foreign_job_id = foreign_job_id.clone();
                job
            })
            .collect();
        debug!(backup_id = %backup.id, reused = ?foreign_job_id.cloudstorage_transfer_job_id, "creating transfer job");

        ensure_active(cancel)?;
        self.repositories.jobs.add_jobs(&jobs)?;
        mark_prepared(self.repositories.backups.as_ref(), backup, next_status, jobs.len())
    }
}
