use super::{mark_prepared, validate, JobCreator};
use crate::enumerator::enumerate_tables;
use crate::models::{Backup, BackupType, Job, SourceMetadata, Strategy};
use crate::provider::BigQueryClient;
use crate::reconciler::{reconcile, JobDescriptor};
use crate::repository::Repositories;
use crate::utils::{ensure_active, EngineError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Creates one extract job per table or partition.
///
/// Mirror backups only get jobs for sources whose checksum changed since the
/// last pass; Snapshot backups get a job for every source on every pass.
pub struct BigQueryJobCreator {
    repositories: Repositories,
    client: Arc<dyn BigQueryClient>,
}

impl BigQueryJobCreator {
    pub fn new(repositories: Repositories, client: Arc<dyn BigQueryClient>) -> Self {
        Self {
            repositories,
            client,
        }
    }

    fn prepare_snapshot_jobs(&self, cancel: &CancellationToken, backup: &Backup) -> Result<usize> {
        let resources = enumerate_tables(cancel, self.client.as_ref(), backup)?;
        let jobs: Vec<Job> = resources
            .iter()
            .map(|r| Job::new(&backup.id, &r.name, BackupType::BigQuery))
            .collect();

        ensure_active(cancel)?;
        if !jobs.is_empty() {
            self.repositories.jobs.add_jobs(&jobs)?;
        }
        Ok(jobs.len())
    }

    fn prepare_mirror_jobs(&self, cancel: &CancellationToken, backup: &Backup) -> Result<usize> {
        let resources = enumerate_tables(cancel, self.client.as_ref(), backup)?;
        let reconciliation = reconcile(
            cancel,
            self.repositories.source_metadata.as_ref(),
            &backup.id,
            &resources,
        )?;

        let jobs: Vec<Job> = reconciliation
            .descriptors
            .iter()
            .map(|d| Job::new(&backup.id, &d.source, BackupType::BigQuery))
            .collect();

        if let Err(e) = self.persist_linked_jobs(&reconciliation.descriptors, &jobs) {
            error!(backup_id = %backup.id, error = %e, "failed to persist mirror jobs, rolling back pass");
            self.roll_back(&reconciliation.appended, &jobs);
            return Err(e);
        }
        Ok(jobs.len())
    }

    /// `jobs[i]` belongs to `descriptors[i]`.
    fn persist_linked_jobs(&self, descriptors: &[JobDescriptor], jobs: &[Job]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        self.repositories.jobs.add_jobs(jobs)?;
        for (descriptor, job) in descriptors.iter().zip(jobs) {
            self.repositories
                .source_metadata_jobs
                .add(descriptor.source_metadata_id, &job.id)?;
        }
        Ok(())
    }

    /// Soft-delete what a failed pass wrote so the next pass diffs against
    /// the previous snapshot again.
    fn roll_back(&self, appended: &[SourceMetadata], jobs: &[Job]) {
        for row in appended {
            if let Err(e) = self.repositories.source_metadata.mark_deleted(row.id) {
                warn!(source_metadata_id = row.id, error = %e, "failed to roll back source metadata");
            }
        }
        for job in jobs {
            if let Err(e) = self.repositories.jobs.mark_deleted(&job.id) {
                warn!(job_id = %job.id, error = %e, "failed to roll back job");
            }
        }
    }
}

impl JobCreator for BigQueryJobCreator {
    fn prepare_jobs(&self, cancel: &CancellationToken, backup: &Backup) -> Result<()> {
        let next_status = validate(backup)?;
        let jobs = match backup.strategy {
            Strategy::Mirror => self.prepare_mirror_jobs(cancel, backup)?,
            Strategy::Snapshot => self.prepare_snapshot_jobs(cancel, backup)?,
            Strategy::Unknown(ref strategy) => {
                return Err(EngineError::UnsupportedStrategy(strategy.clone()))
            }
        };
        mark_prepared(self.repositories.backups.as_ref(), backup, next_status, jobs)
    }
}
