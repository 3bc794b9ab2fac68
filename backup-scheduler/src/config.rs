use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub db_path: PathBuf,
    pub db_pool_size: u32,
    /// Six-field cron expression (with seconds) for job preparation.
    pub prepare_cron: String,
    /// Cron expression for the cleanup candidate scan.
    pub cleanup_cron: String,
    pub log_level: String,
    pub trashcan_retention_weeks: u32,
    pub max_revision_lifetime_weeks: u32,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str, default: u32| -> u32 {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Self {
            db_path: PathBuf::from(
                lookup("BACKUP_DB_PATH").unwrap_or_else(|| "data/backups.db".into()),
            ),
            db_pool_size: parsed("DB_POOL_SIZE", 4).max(1),
            prepare_cron: lookup("PREPARE_CRON").unwrap_or_else(|| "0 */5 * * * *".into()),
            cleanup_cron: lookup("CLEANUP_CRON").unwrap_or_else(|| "0 30 * * * *".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            trashcan_retention_weeks: parsed("TRASHCAN_RETENTION_WEEKS", 2),
            max_revision_lifetime_weeks: parsed("MAX_REVISION_LIFETIME_WEEKS", 4),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
