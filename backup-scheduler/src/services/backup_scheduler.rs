use crate::db::connection::close_pool;
use crate::services::cleanup::collect_candidates;
use crate::services::prepare_jobs::{due_backups, run_pass};
use crate::state::SchedulerState;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<SchedulerState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<SchedulerState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    /// Register the preparation and cleanup scan jobs from the config.
    pub async fn init_schedules(&self) -> anyhow::Result<()> {
        let prepare_cron = self.state.config.prepare_cron.clone();
        let cleanup_cron = self.state.config.cleanup_cron.clone();

        let state = self.state.clone();
        let prepare = Job::new_async(prepare_cron.as_str(), move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                match run_prepare_tick(state).await {
                    Ok(prepared) => tracing::info!(prepared, "Prepare tick finished"),
                    Err(e) => tracing::error!(error = %e, "Prepare tick failed"),
                }
            })
        })?;

        let state = self.state.clone();
        let cleanup = Job::new_async(cleanup_cron.as_str(), move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                if let Err(e) = run_cleanup_scan(state).await {
                    tracing::error!(error = %e, "Cleanup scan failed");
                }
            })
        })?;

        let scheduler = self.scheduler.lock().await;
        let prepare_id: Uuid = scheduler.add(prepare).await?;
        let cleanup_id: Uuid = scheduler.add(cleanup).await?;
        tracing::info!(%prepare_id, prepare = %prepare_cron, "Preparation schedule added");
        tracing::info!(%cleanup_id, cleanup = %cleanup_cron, "Cleanup schedule added");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop firing new ticks and cancel passes that are still running.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.state.cancel.cancel();
        self.scheduler.lock().await.shutdown().await?;
        if let Some(pool) = self.state.db() {
            close_pool(pool);
        }
        Ok(())
    }
}

/// Prepare every due backup that has no pass in flight. Passes for different
/// backups run concurrently on the blocking pool.
///
/// Returns the number of backups prepared successfully.
pub async fn run_prepare_tick(state: Arc<SchedulerState>) -> anyhow::Result<usize> {
    if state.cancel.is_cancelled() {
        return Ok(0);
    }

    let processor = state.processor.clone();
    let due = tokio::task::spawn_blocking(move || due_backups(&processor, Utc::now())).await??;
    if due.is_empty() {
        tracing::debug!("No backups to prepare");
        return Ok(0);
    }

    let mut passes = JoinSet::new();
    for backup in due {
        {
            let mut running = state.running_backups.lock().await;
            if !running.insert(backup.id.clone()) {
                tracing::warn!(backup_id = %backup.id, "Skipping scheduled run: backup already being prepared");
                continue;
            }
        }

        let state = state.clone();
        passes.spawn(async move {
            let backup_id = backup.id.clone();
            let pass_state = state.clone();
            let result = tokio::task::spawn_blocking(move || {
                run_pass(
                    &pass_state.cancel,
                    &pass_state.processor,
                    pass_state.providers.as_ref(),
                    &backup,
                )
            })
            .await;
            state.running_backups.lock().await.remove(&backup_id);
            matches!(result, Ok(Ok(())))
        });
    }

    let mut prepared = 0;
    while let Some(outcome) = passes.join_next().await {
        match outcome {
            Ok(true) => prepared += 1,
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "Preparation task panicked"),
        }
    }
    Ok(prepared)
}

pub async fn run_cleanup_scan(state: Arc<SchedulerState>) -> anyhow::Result<()> {
    let processor = state.processor.clone();
    let config = state.config.clone();
    tokio::task::spawn_blocking(move || collect_candidates(&processor, &config)).await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use backup_engine::models::{Backup, BackupType, JobPage, Strategy};
    use backup_engine::provider::{
        BigQueryClient, CloudStorageClient, ProviderFactory, ProviderResult, Resource,
    };
    use backup_engine::repository::{BackupRepository, JobRepository, MemoryStore};
    use backup_engine::Repositories;

    struct Buckets;

    impl CloudStorageClient for Buckets {
        fn does_bucket_exist(&self, _project: &str, _bucket: &str) -> ProviderResult<bool> {
            Ok(true)
        }
    }

    struct NoTables;

    impl BigQueryClient for NoTables {
        fn get_tables_in_dataset(&self, _dataset: &str) -> ProviderResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn get_table(&self, _dataset: &str, table: &str) -> ProviderResult<Resource> {
            Ok(Resource::new(table, "", 0))
        }

        fn has_table_partitions(&self, _dataset: &str, _table: &str) -> ProviderResult<bool> {
            Ok(false)
        }

        fn get_table_partitions(&self, _dataset: &str, _table: &str) -> ProviderResult<Vec<Resource>> {
            Ok(Vec::new())
        }
    }

    struct Providers;

    impl ProviderFactory for Providers {
        fn bigquery(&self, _source: &str, _target: &str) -> anyhow::Result<Arc<dyn BigQueryClient>> {
            Ok(Arc::new(NoTables))
        }

        fn cloud_storage(&self, _target: &str) -> anyhow::Result<Arc<dyn CloudStorageClient>> {
            Ok(Arc::new(Buckets))
        }
    }

    fn state_with(ids: &[&str]) -> (Arc<MemoryStore>, Arc<SchedulerState>) {
        let store = Arc::new(MemoryStore::new());
        for id in ids {
            let mut backup = Backup::new(*id, BackupType::CloudStorage, Strategy::Mirror, "p");
            backup.cloud_storage.bucket = format!("{id}-bucket");
            store.add_backup(&backup).unwrap();
        }
        let state = SchedulerState::new(
            SchedulerConfig::default(),
            Repositories::from_store(store.clone()),
            Arc::new(Providers),
        );
        (store, Arc::new(state))
    }

    #[tokio::test]
    async fn test_prepare_tick_runs_due_backups() {
        let (store, state) = state_with(&["a", "b"]);
        let prepared = run_prepare_tick(state.clone()).await.unwrap();
        assert_eq!(prepared, 2);
        assert_eq!(store.get_for_backup("a", JobPage::all()).unwrap().len(), 1);
        assert!(state.running_backups.lock().await.is_empty());

        // Both were just prepared and are not due again.
        assert_eq!(run_prepare_tick(state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prepare_tick_skips_running_backups() {
        let (store, state) = state_with(&["a", "b"]);
        state.running_backups.lock().await.insert("a".to_string());

        assert_eq!(run_prepare_tick(state.clone()).await.unwrap(), 1);
        assert!(store.get_for_backup("a", JobPage::all()).unwrap().is_empty());
        assert_eq!(store.get_for_backup("b", JobPage::all()).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_cancels_ticks() {
        let (store, state) = state_with(&["a"]);
        let scheduler = BackupScheduler::new(state.clone()).await.unwrap();
        scheduler.init_schedules().await.unwrap();
        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();

        assert!(state.cancel.is_cancelled());
        assert_eq!(run_prepare_tick(state).await.unwrap(), 0);
        assert!(store.get_for_backup("a", JobPage::all()).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_is_rejected() {
        let (_store, state) = state_with(&[]);
        let mut config = SchedulerConfig::default();
        config.prepare_cron = "every five minutes".into();
        let state = Arc::new(SchedulerState::new(
            config,
            state.processor.repositories().clone(),
            Arc::new(Providers),
        ));
        let scheduler = BackupScheduler::new(state).await.unwrap();
        assert!(scheduler.init_schedules().await.is_err());
    }
}
