//! Selection of mirror revisions whose sink data can be removed.
//!
//! Stores collect [`RevisionCandidate`]s (a source metadata row joined with its
//! job link and backup) and hand them to [`select_expired_revisions`].

use crate::models::{BackupStatus, JobStatus, MirrorRevision, Operation, Strategy};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct RevisionCandidate {
    pub source_metadata_id: i64,
    pub backup_id: String,
    pub source: String,
    pub operation: Operation,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub job_id: Option<String>,
    pub job_status: Option<JobStatus>,
    pub backup_strategy: Strategy,
    pub backup_status: BackupStatus,
    pub mirror_lifetime_in_days: u32,
    pub bigquery_dataset: String,
    pub target_project: String,
    pub target_sink: String,
}

impl RevisionCandidate {
    fn is_cleanable(&self) -> bool {
        !self.deleted
            && self.job_status.map_or(true, |s| s == JobStatus::FinishedOk)
            && self.backup_status != BackupStatus::BackupDeleted
    }

    fn to_revision(&self) -> MirrorRevision {
        MirrorRevision {
            source_metadata_id: self.source_metadata_id,
            job_id: self.job_id.clone(),
            backup_id: self.backup_id.clone(),
            bigquery_dataset: self.bigquery_dataset.clone(),
            source: self.source.clone(),
            target_project: self.target_project.clone(),
            target_sink: self.target_sink.clone(),
        }
    }
}

/// Revisions that are either superseded for longer than
/// `max_revision_lifetime_weeks` or older than their backup's mirror lifetime.
///
/// The result is de-duplicated by metadata id and ordered by it.
pub fn select_expired_revisions(
    candidates: &[RevisionCandidate],
    max_revision_lifetime_weeks: u32,
    now: DateTime<Utc>,
) -> Vec<MirrorRevision> {
    let successors = successors(candidates);
    let revision_cutoff = now - Duration::weeks(i64::from(max_revision_lifetime_weeks));

    let mut selected: BTreeMap<i64, MirrorRevision> = BTreeMap::new();
    for candidate in candidates.iter().filter(|c| c.is_cleanable()) {
        let superseded = candidate.backup_strategy == Strategy::Mirror
            && candidate.created_at < revision_cutoff
            && match successors.get(&candidate.source_metadata_id) {
                Some((operation, created_at)) => {
                    *operation != Operation::Delete
                        || *created_at < revision_cutoff
                        || candidate.operation == Operation::Delete
                }
                None => candidate.operation == Operation::Delete,
            };

        let past_ttl = candidate.mirror_lifetime_in_days > 0
            && candidate.created_at
                < now - Duration::days(i64::from(candidate.mirror_lifetime_in_days));

        if superseded || past_ttl {
            selected
                .entry(candidate.source_metadata_id)
                .or_insert_with(|| candidate.to_revision());
        }
    }
    selected.into_values().collect()
}

/// Next row (operation, creation time) of the same backup and source.
fn successors(candidates: &[RevisionCandidate]) -> HashMap<i64, (Operation, DateTime<Utc>)> {
    let mut by_source: HashMap<(&str, &str), BTreeMap<(DateTime<Utc>, i64), Operation>> =
        HashMap::new();
    for c in candidates {
        by_source
            .entry((c.backup_id.as_str(), c.source.as_str()))
            .or_default()
            .insert((c.created_at, c.source_metadata_id), c.operation);
    }

    let mut successors = HashMap::new();
    for rows in by_source.values() {
        let ordered: Vec<_> = rows.iter().collect();
        for pair in ordered.windows(2) {
            let ((_, id), _) = pair[0];
            let ((created_at, _), operation) = pair[1];
            successors.insert(*id, (*operation, *created_at));
        }
    }
    successors
}
