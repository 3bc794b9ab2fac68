use super::{BackupStatus, BackupType, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where backed up data is written to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkOptions {
    pub target_project: String,
    pub region: String,
    pub sink: String,
    pub storage_class: String,
    /// Days before sink objects move to archive storage (0 = never).
    pub archive_ttm: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    pub lifetime_in_days: u32,
    /// 0 marks a one-shot snapshot.
    pub frequency_in_hours: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorOptions {
    pub lifetime_in_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigQueryOptions {
    pub dataset: String,
    /// Explicit tables; empty means the whole dataset.
    pub tables: Vec<String>,
    pub excluded_tables: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudStorageOptions {
    pub bucket: String,
    pub include_path: Vec<String>,
    pub exclude_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub backup_type: BackupType,
    pub strategy: Strategy,
    pub status: BackupStatus,
    pub source_project: String,
    pub sink: SinkOptions,
    pub snapshot: SnapshotOptions,
    pub mirror: MirrorOptions,
    pub bigquery: BigQueryOptions,
    pub cloud_storage: CloudStorageOptions,
    pub last_scheduled_time: Option<DateTime<Utc>>,
    pub last_cleanup_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Backup {
    /// A fresh, not yet started backup.
    pub fn new(
        id: impl Into<String>,
        backup_type: BackupType,
        strategy: Strategy,
        source_project: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            backup_type,
            strategy,
            status: BackupStatus::NotStarted,
            source_project: source_project.into(),
            sink: SinkOptions::default(),
            snapshot: SnapshotOptions::default(),
            mirror: MirrorOptions::default(),
            bigquery: BigQueryOptions::default(),
            cloud_storage: CloudStorageOptions::default(),
            last_scheduled_time: None,
            last_cleanup_time: None,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Sink prefix that objects deleted at the source are moved under.
    pub fn trashcan_path(&self) -> String {
        format!(".trashcan_{}", self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl fmt::Display for Backup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backupID={} type={} status={} strategy={} sourceProject={} targetProject={} sink={}",
            self.id,
            self.backup_type,
            self.status,
            self.strategy,
            self.source_project,
            self.sink.target_project,
            self.sink.sink,
        )?;
        match self.backup_type {
            BackupType::BigQuery => write!(
                f,
                " dataset={} tables={:?} excludedTables={:?}",
                self.bigquery.dataset, self.bigquery.tables, self.bigquery.excluded_tables
            ),
            BackupType::CloudStorage => write!(f, " bucket={}", self.cloud_storage.bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trashcan_path_and_display() {
        let mut backup = Backup::new("b-42", BackupType::CloudStorage, Strategy::Mirror, "src");
        backup.cloud_storage.bucket = "photos".into();
        assert_eq!(backup.trashcan_path(), ".trashcan_b-42");
        assert!(!backup.is_deleted());

        let line = backup.to_string();
        assert!(line.starts_with("backupID=b-42 type=CloudStorage"));
        assert!(line.ends_with("bucket=photos"));
    }
}
