use crate::config::SchedulerConfig;
use backup_engine::models::{Backup, BackupType, MirrorRevision, SourceTrashcan};
use backup_engine::ScheduleProcessor;

/// Sink data that is due for removal, as reported by the stores.
#[derive(Debug, Default)]
pub struct CleanupCandidates {
    pub expired_backups: Vec<Backup>,
    pub expired_revisions: Vec<MirrorRevision>,
    pub trashcan_entries: Vec<SourceTrashcan>,
}

impl CleanupCandidates {
    pub fn is_empty(&self) -> bool {
        self.expired_backups.is_empty()
            && self.expired_revisions.is_empty()
            && self.trashcan_entries.is_empty()
    }
}

/// Collect everything the cleanup workers should remove, using the retention
/// windows from `config`.
pub fn collect_candidates(
    processor: &ScheduleProcessor,
    config: &SchedulerConfig,
) -> anyhow::Result<CleanupCandidates> {
    let mut candidates = CleanupCandidates::default();
    for backup_type in BackupType::ALL {
        candidates
            .expired_backups
            .extend(processor.get_expired_backups(backup_type)?);
    }
    candidates.expired_revisions =
        processor.get_expired_mirror_revisions(config.max_revision_lifetime_weeks)?;
    candidates.trashcan_entries =
        processor.get_trashcan_entries_before(config.trashcan_retention_weeks)?;

    tracing::info!(
        expired_backups = candidates.expired_backups.len(),
        expired_revisions = candidates.expired_revisions.len(),
        trashcan_entries = candidates.trashcan_entries.len(),
        "Cleanup candidates collected"
    );
    Ok(candidates)
}
