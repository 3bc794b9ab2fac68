use crate::config::SchedulerConfig;
use crate::db::connection::{create_pool, DbPool};
use crate::db::migrate::migrate;
use crate::store::SqliteStore;
use backup_engine::provider::ProviderFactory;
use backup_engine::{Repositories, ScheduleProcessor};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct SchedulerState {
    pub config: SchedulerConfig,
    pub processor: ScheduleProcessor,
    pub providers: Arc<dyn ProviderFactory>,
    /// Backups with a preparation pass in flight.
    pub running_backups: Arc<Mutex<HashSet<String>>>,
    /// Cancelled on shutdown; passes stop at their next provider or store call.
    pub cancel: CancellationToken,
    db: Option<DbPool>,
}

impl SchedulerState {
    pub fn new(
        config: SchedulerConfig,
        repositories: Repositories,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            processor: ScheduleProcessor::new(repositories),
            providers,
            running_backups: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancellationToken::new(),
            db: None,
        }
    }

    /// State backed by the SQLite database at `config.db_path`.
    pub fn open(config: SchedulerConfig, providers: Arc<dyn ProviderFactory>) -> anyhow::Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pool = create_pool(&config.db_path.to_string_lossy(), config.db_pool_size)?;
        migrate(&pool)?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let mut state = Self::new(config, Repositories::from_store(store), providers);
        state.db = Some(pool);
        Ok(state)
    }

    pub fn db(&self) -> Option<&DbPool> {
        self.db.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_engine::models::{Backup, BackupType, Strategy};
    use backup_engine::provider::{BigQueryClient, CloudStorageClient};
    use tempfile::TempDir;

    struct NoProviders;

    impl ProviderFactory for NoProviders {
        fn bigquery(&self, _source: &str, _target: &str) -> anyhow::Result<Arc<dyn BigQueryClient>> {
            anyhow::bail!("not configured")
        }

        fn cloud_storage(&self, _target: &str) -> anyhow::Result<Arc<dyn CloudStorageClient>> {
            anyhow::bail!("not configured")
        }
    }

    #[test]
    fn test_open_creates_migrated_database() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = SchedulerConfig {
            db_path: dir.path().join("nested").join("backups.db"),
            ..SchedulerConfig::default()
        };
        let state = SchedulerState::open(config, Arc::new(NoProviders))?;
        assert!(state.db().is_some());

        let backup = Backup::new("b1", BackupType::BigQuery, Strategy::Mirror, "p");
        state.processor.repositories().backups.add_backup(&backup)?;
        assert_eq!(state.processor.get_backup("b1")?.id, "b1");
        Ok(())
    }
}
