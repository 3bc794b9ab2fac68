//! Domain records owned by the repositories.

mod backup;
mod job;
mod source_metadata;
mod status;
mod trashcan;

pub use backup::{
    Backup, BigQueryOptions, CloudStorageOptions, MirrorOptions, SinkOptions, SnapshotOptions,
};
pub use job::{ForeignJobId, Job, JobPage, JobPatch};
pub use source_metadata::{MirrorRevision, NewSourceMetadata, SourceMetadata};
pub use status::{BackupStatus, BackupType, JobStatus, Operation, Strategy};
pub use trashcan::{SourceTrashcan, TrashcanEntry};

use std::collections::BTreeMap;

/// Number of jobs per status for one backup.
pub type JobStatistics = BTreeMap<JobStatus, u64>;
