use super::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only audit row recording the observed state of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub id: i64,
    pub backup_id: String,
    pub source: String,
    pub source_checksum: String,
    pub operation: Operation,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A row to append; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSourceMetadata {
    pub backup_id: String,
    pub source: String,
    pub source_checksum: String,
    pub operation: Operation,
}

impl NewSourceMetadata {
    pub fn new(backup_id: &str, source: &str, checksum: &str, operation: Operation) -> Self {
        Self {
            backup_id: backup_id.to_string(),
            source: source.to_string(),
            source_checksum: checksum.to_string(),
            operation,
        }
    }
}

/// A past mirror revision whose sink data may be cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRevision {
    pub source_metadata_id: i64,
    pub job_id: Option<String>,
    pub backup_id: String,
    pub bigquery_dataset: String,
    pub source: String,
    pub target_project: String,
    pub target_sink: String,
}
