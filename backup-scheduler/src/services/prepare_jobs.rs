use backup_engine::models::{Backup, BackupType, Strategy};
use backup_engine::provider::ProviderFactory;
use backup_engine::{EngineError, ScheduleProcessor};
use chrono::{DateTime, Duration, Timelike, Utc};
use tokio_util::sync::CancellationToken;

/// Whether `backup` should get a new preparation pass at `now`.
///
/// Mirrors run hourly. Recurring snapshots run on the full hour once their
/// frequency has elapsed; one-shot snapshots run once.
pub fn is_next_schedule_time(backup: &Backup, now: DateTime<Utc>) -> bool {
    let last = backup.last_scheduled_time;
    match backup.strategy {
        Strategy::Mirror => last.map_or(true, |t| t + Duration::hours(1) < now),
        Strategy::Snapshot => {
            let frequency = backup.snapshot.frequency_in_hours;
            if frequency == 0 {
                return last.is_none();
            }
            let elapsed = last.map_or(true, |t| t + Duration::hours(i64::from(frequency)) < now);
            elapsed && now.minute() == 0
        }
        Strategy::Unknown(_) => false,
    }
}

/// Scheduled backups of every type that are due at `now`.
pub fn due_backups(processor: &ScheduleProcessor, now: DateTime<Utc>) -> anyhow::Result<Vec<Backup>> {
    let mut due = Vec::new();
    for backup_type in BackupType::ALL {
        let backups = processor.get_scheduled_backups(backup_type)?;
        let total = backups.len();
        due.extend(backups.into_iter().filter(|b| is_next_schedule_time(b, now)));
        tracing::debug!(backup_type = %backup_type, total, "Loaded scheduled backups");
    }
    Ok(due)
}

/// Run one preparation pass and log its outcome.
pub fn run_pass(
    cancel: &CancellationToken,
    processor: &ScheduleProcessor,
    providers: &dyn ProviderFactory,
    backup: &Backup,
) -> Result<(), EngineError> {
    tracing::info!(backup = %backup, "[START] Preparing backup jobs");
    match processor.prepare_backup(cancel, providers, backup) {
        Ok(()) => {
            tracing::info!(backup_id = %backup.id, "[SUCCESS] Backup jobs prepared");
            Ok(())
        }
        Err(EngineError::Cancelled) => {
            tracing::warn!(backup_id = %backup.id, "Preparation cancelled");
            Err(EngineError::Cancelled)
        }
        Err(e) => {
            tracing::warn!(backup_id = %backup.id, error = %e, "[FAIL] Preparing backup jobs failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_engine::models::{BackupStatus, JobStatus};
    use backup_engine::provider::{BigQueryClient, CloudStorageClient, ProviderResult, Resource};
    use backup_engine::repository::{BackupRepository, MemoryStore};
    use backup_engine::{ProviderError, Repositories};
    use std::sync::Arc;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("2024-03-10T{hour:02}:{minute:02}:00Z"))
            .unwrap()
            .with_timezone(&Utc)
    }

    fn backup(strategy: Strategy, last: Option<DateTime<Utc>>, frequency: u32) -> Backup {
        let mut backup = Backup::new("b1", BackupType::BigQuery, strategy, "p");
        backup.last_scheduled_time = last;
        backup.snapshot.frequency_in_hours = frequency;
        backup
    }

    #[test]
    fn test_mirror_runs_hourly() {
        assert!(is_next_schedule_time(&backup(Strategy::Mirror, None, 0), at(10, 17)));
        assert!(!is_next_schedule_time(&backup(Strategy::Mirror, Some(at(10, 0)), 0), at(10, 59)));
        assert!(is_next_schedule_time(&backup(Strategy::Mirror, Some(at(10, 0)), 0), at(11, 1)));
    }

    #[test]
    fn test_recurring_snapshot_waits_for_full_hour() {
        let b = backup(Strategy::Snapshot, Some(at(0, 0)), 6);
        assert!(!is_next_schedule_time(&b, at(5, 0)));
        assert!(!is_next_schedule_time(&b, at(7, 30)));
        assert!(is_next_schedule_time(&b, at(7, 0)));
        assert!(is_next_schedule_time(&backup(Strategy::Snapshot, None, 6), at(3, 0)));
        assert!(!is_next_schedule_time(&backup(Strategy::Snapshot, None, 6), at(3, 5)));
    }

    #[test]
    fn test_one_shot_snapshot_runs_once() {
        assert!(is_next_schedule_time(&backup(Strategy::Snapshot, None, 0), at(3, 5)));
        assert!(!is_next_schedule_time(&backup(Strategy::Snapshot, Some(at(1, 0)), 0), at(9, 0)));
    }

    #[test]
    fn test_unknown_strategy_is_never_due() {
        assert!(!is_next_schedule_time(&backup(Strategy::Unknown("x".into()), None, 0), at(0, 0)));
    }

    struct Tables;

    impl BigQueryClient for Tables {
        fn get_tables_in_dataset(&self, _dataset: &str) -> ProviderResult<Vec<String>> {
            Ok(vec!["orders".into()])
        }

        fn get_table(&self, _dataset: &str, table: &str) -> ProviderResult<Resource> {
            Ok(Resource::new(table, "etag-1", 100))
        }

        fn has_table_partitions(&self, _dataset: &str, _table: &str) -> ProviderResult<bool> {
            Ok(false)
        }

        fn get_table_partitions(&self, _dataset: &str, table: &str) -> ProviderResult<Vec<Resource>> {
            Err(ProviderError::NotFound(table.to_string()))
        }
    }

    struct Providers;

    impl ProviderFactory for Providers {
        fn bigquery(&self, _source: &str, _target: &str) -> anyhow::Result<Arc<dyn BigQueryClient>> {
            Ok(Arc::new(Tables))
        }

        fn cloud_storage(&self, _target: &str) -> anyhow::Result<Arc<dyn CloudStorageClient>> {
            anyhow::bail!("no cloud storage in this test")
        }
    }

    #[test]
    fn test_due_backups_are_prepared_once() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let processor = ScheduleProcessor::new(Repositories::from_store(store.clone()));
        store.add_backup(&Backup::new("mirror", BackupType::BigQuery, Strategy::Mirror, "p"))?;
        let mut paused = Backup::new("paused", BackupType::BigQuery, Strategy::Mirror, "p");
        paused.status = BackupStatus::Paused;
        store.add_backup(&paused)?;
        store.add_backup(&Backup::new("bucket", BackupType::CloudStorage, Strategy::Mirror, "p"))?;

        let now = Utc::now();
        let due = due_backups(&processor, now)?;
        let ids: Vec<&str> = due.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["mirror", "bucket"]);

        let cancel = CancellationToken::new();
        run_pass(&cancel, &processor, &Providers, &due[0])?;
        assert!(run_pass(&cancel, &processor, &Providers, &due[1]).is_err());

        let jobs = processor.get_next_backup_jobs(BackupType::BigQuery)?;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::NotScheduled);

        // Prepared a moment ago, so not due again within the hour.
        let due = due_backups(&processor, Utc::now())?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "bucket");
        Ok(())
    }
}
