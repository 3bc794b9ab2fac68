//! Job creators: turn a due backup into persisted jobs.
//!
//! Every creator validates the strategy and the lifecycle transition before
//! its first write, and only marks the backup `Prepared` once all of its jobs
//! were stored.

mod bigquery;
mod cloudstorage;

pub use bigquery::BigQueryJobCreator;
pub use cloudstorage::CloudStorageJobCreator;

use crate::lifecycle;
use crate::models::{Backup, BackupStatus, Strategy};
use crate::repository::BackupRepository;
use crate::utils::{EngineError, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub trait JobCreator: Send + Sync {
    /// Create the jobs of one backup pass.
    fn prepare_jobs(&self, cancel: &CancellationToken, backup: &Backup) -> Result<()>;
}

/// Status the backup moves to once the pass succeeded.
///
/// Rejects unknown strategies and illegal transitions up front.
fn validate(backup: &Backup) -> Result<BackupStatus> {
    if let Strategy::Unknown(strategy) = &backup.strategy {
        return Err(EngineError::UnsupportedStrategy(strategy.clone()));
    }
    lifecycle::prepared_from(backup.status)
}

/// Record the pass and move the backup to `status`.
///
/// The write only applies while the backup still has the status the pass
/// started from. If it changed in the meantime, the new status is validated
/// again, so a backup paused or deleted mid-pass keeps its status.
fn mark_prepared(
    backups: &dyn BackupRepository,
    backup: &Backup,
    status: BackupStatus,
    jobs: usize,
) -> Result<()> {
    let now = Utc::now();
    if !backups.update_last_scheduled_time(&backup.id, now, backup.status, status)? {
        let current = backups
            .get_backup(&backup.id)?
            .ok_or_else(|| EngineError::BackupNotFound(backup.id.clone()))?;
        warn!(
            backup_id = %backup.id,
            expected = %backup.status,
            current = %current.status,
            "backup status changed during the pass"
        );
        let target = lifecycle::prepared_from(current.status)?;
        if !backups.update_last_scheduled_time(&backup.id, now, current.status, target)? {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }
    }
    info!(backup_id = %backup.id, strategy = %backup.strategy, jobs, "prepared backup jobs");
    Ok(())
}
