use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object moved into the trashcan path after it disappeared at the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrashcan {
    pub backup_id: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrashcanEntry {
    pub backup_id: String,
    pub source: String,
}

impl TrashcanEntry {
    pub fn new(backup_id: &str, source: &str) -> Self {
        Self {
            backup_id: backup_id.to_string(),
            source: source.to_string(),
        }
    }
}

impl From<&SourceTrashcan> for TrashcanEntry {
    fn from(value: &SourceTrashcan) -> Self {
        TrashcanEntry::new(&value.backup_id, &value.source)
    }
}
