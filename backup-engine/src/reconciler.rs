//! Change detection between the enumerated source state and the last
//! persisted snapshot of a backup.
//!
//! Source metadata is append-only: every pass adds one row per changed source
//! and never touches older rows, so the newest row per source is always the
//! last observed state.

use crate::models::{NewSourceMetadata, Operation, SourceMetadata};
use crate::provider::Resource;
use crate::repository::SourceMetadataRepository;
use crate::utils::{ensure_active, EngineError, Result};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A source that needs a job, joined with the metadata row that justified it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub source: String,
    pub source_metadata_id: i64,
}

/// Outcome of comparing one pass against the last snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub to_add: Vec<NewSourceMetadata>,
    pub to_update: Vec<NewSourceMetadata>,
    pub to_delete: Vec<NewSourceMetadata>,
}

impl Classification {
    /// Sources that need a job, in classification order.
    pub fn job_sources(&self) -> impl Iterator<Item = &str> {
        self.to_add
            .iter()
            .chain(self.to_update.iter())
            .map(|m| m.source.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    fn into_rows(self) -> Vec<NewSourceMetadata> {
        let mut rows = self.to_add;
        rows.extend(self.to_update);
        rows.extend(self.to_delete);
        rows
    }
}

/// Classify `resources` against the last row per source.
///
/// Deletes carry the checksum last seen for the source.
pub fn classify(backup_id: &str, resources: &[Resource], last: &[SourceMetadata]) -> Classification {
    let by_source: HashMap<&str, &SourceMetadata> =
        last.iter().map(|m| (m.source.as_str(), m)).collect();
    let mut out = Classification::default();

    for resource in resources {
        match by_source.get(resource.name.as_str()) {
            None => out.to_add.push(NewSourceMetadata::new(
                backup_id,
                &resource.name,
                &resource.checksum,
                Operation::Add,
            )),
            Some(prior) if prior.source_checksum == resource.checksum => {}
            Some(_) => out.to_update.push(NewSourceMetadata::new(
                backup_id,
                &resource.name,
                &resource.checksum,
                Operation::Update,
            )),
        }
    }

    let present: HashSet<&str> = resources.iter().map(|r| r.name.as_str()).collect();
    let mut gone: Vec<&SourceMetadata> = last
        .iter()
        .filter(|m| m.operation != Operation::Delete && !present.contains(m.source.as_str()))
        .collect();
    gone.sort_by(|a, b| a.source.cmp(&b.source));
    out.to_delete = gone
        .into_iter()
        .map(|m| NewSourceMetadata::new(backup_id, &m.source, &m.source_checksum, Operation::Delete))
        .collect();

    out
}

/// Results of one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub descriptors: Vec<JobDescriptor>,
    /// Every row appended by this pass, Deletes included.
    pub appended: Vec<SourceMetadata>,
}

/// Diff `resources` against the stored snapshot and append the changes as
/// one batch.
pub fn reconcile(
    cancel: &CancellationToken,
    repository: &dyn SourceMetadataRepository,
    backup_id: &str,
    resources: &[Resource],
) -> Result<Reconciliation> {
    ensure_active(cancel)?;
    let last = repository.get_last_by_backup_id(backup_id)?;
    let classification = classify(backup_id, resources, &last);

    info!(
        backup_id,
        resources = resources.len(),
        to_add = classification.to_add.len(),
        to_update = classification.to_update.len(),
        to_delete = classification.to_delete.len(),
        "reconciled source metadata"
    );

    if classification.is_empty() {
        return Ok(Reconciliation::default());
    }

    let job_sources: Vec<String> = classification.job_sources().map(str::to_string).collect();
    ensure_active(cancel)?;
    let appended = repository.add(&classification.into_rows())?;

    let descriptors = attach_ids(backup_id, &job_sources, &appended)?;
    Ok(Reconciliation {
        descriptors,
        appended,
    })
}

fn attach_ids(
    backup_id: &str,
    sources: &[String],
    appended: &[SourceMetadata],
) -> Result<Vec<JobDescriptor>> {
    let ids: HashMap<&str, i64> = appended
        .iter()
        .filter(|m| m.operation != Operation::Delete)
        .map(|m| (m.source.as_str(), m.id))
        .collect();
    sources
        .iter()
        .map(|source| match ids.get(source.as_str()) {
            Some(id) => Ok(JobDescriptor {
                source: source.clone(),
                source_metadata_id: *id,
            }),
            None => Err(EngineError::MissingSourceMetadata {
                backup_id: backup_id.to_string(),
                table: source.clone(),
            }),
        })
        .collect()
}
