//! Backup Scheduler Library
//!
//! SQLite-backed repositories for the backup engine and the cron jobs that
//! drive preparation passes and cleanup scans.

pub mod config;
pub mod db;
pub mod logger;
pub mod services;
pub mod state;
pub mod store;

pub use config::SchedulerConfig;
pub use services::backup_scheduler::BackupScheduler;
pub use state::SchedulerState;
pub use store::SqliteStore;

use backup_engine::provider::ProviderFactory;
use std::future::Future;
use std::sync::Arc;

/// Open the database, start the cron jobs and keep them running until
/// `shutdown` resolves.
pub async fn run<F>(
    config: SchedulerConfig,
    providers: Arc<dyn ProviderFactory>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tracing::info!(db_path = %config.db_path.display(), "Starting backup scheduler");
    let state = Arc::new(SchedulerState::open(config, providers)?);

    let scheduler = BackupScheduler::new(state).await?;
    scheduler.init_schedules().await?;
    scheduler.start().await?;

    shutdown.await;
    tracing::info!("Shutting down backup scheduler");
    scheduler.shutdown().await
}

/// Entry point for embedders: configuration from the environment, logging,
/// then [`run`] until Ctrl+C.
pub async fn run_from_env(providers: Arc<dyn ProviderFactory>) -> anyhow::Result<()> {
    let config = SchedulerConfig::from_env();
    logger::init(&config.log_level)?;
    run(config, providers, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl+c");
        }
    })
    .await
}
