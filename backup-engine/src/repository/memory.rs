//! Process-local store implementing every repository contract.
//!
//! Used by tests and by embedders that do not need durability.

use super::revisions::{select_expired_revisions, RevisionCandidate};
use super::{
    BackupRepository, JobRepository, SourceMetadataJobRepository, SourceMetadataRepository,
    SourceTrashcanRepository,
};
use crate::models::{
    Backup, BackupStatus, BackupType, Job, JobPage, JobPatch, JobStatistics, JobStatus,
    MirrorRevision, NewSourceMetadata, SourceMetadata, SourceTrashcan, TrashcanEntry,
};
use anyhow::{anyhow, bail};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    backups: Vec<Backup>,
    jobs: Vec<Job>,
    source_metadata: Vec<SourceMetadata>,
    /// (source_metadata_id, job_id)
    links: Vec<(i64, String)>,
    trashcan: Vec<SourceTrashcan>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Every metadata row of a backup, soft-deleted ones included, oldest first.
    pub fn source_metadata_rows(&self, backup_id: &str) -> anyhow::Result<Vec<SourceMetadata>> {
        Ok(self
            .lock()?
            .source_metadata
            .iter()
            .filter(|m| m.backup_id == backup_id)
            .cloned()
            .collect())
    }

    /// All (source_metadata_id, job_id) links.
    pub fn links(&self) -> anyhow::Result<Vec<(i64, String)>> {
        Ok(self.lock()?.links.clone())
    }
}

impl BackupRepository for MemoryStore {
    fn add_backup(&self, backup: &Backup) -> anyhow::Result<Backup> {
        let mut inner = self.lock()?;
        if inner.backups.iter().any(|b| b.id == backup.id) {
            bail!("backup {} already exists", backup.id);
        }
        inner.backups.push(backup.clone());
        Ok(backup.clone())
    }

    fn get_backup(&self, id: &str) -> anyhow::Result<Option<Backup>> {
        Ok(self.lock()?.backups.iter().find(|b| b.id == id).cloned())
    }

    fn update_last_scheduled_time(
        &self,
        id: &str,
        time: DateTime<Utc>,
        expected: BackupStatus,
        status: BackupStatus,
    ) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        match inner
            .backups
            .iter_mut()
            .find(|b| b.id == id && !b.is_deleted() && b.status == expected)
        {
            Some(backup) => {
                backup.last_scheduled_time = Some(time);
                backup.status = status;
                backup.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_last_cleanup_time(&self, id: &str, time: DateTime<Utc>) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(backup) = inner
            .backups
            .iter_mut()
            .find(|b| b.id == id && !b.is_deleted())
        {
            backup.last_cleanup_time = Some(time);
            backup.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    fn mark_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(backup) = inner.backups.iter_mut().find(|b| b.id == id) {
            let now = Utc::now();
            backup.status = status;
            backup.updated_at = Some(now);
            backup.deleted_at = if status == BackupStatus::BackupDeleted {
                backup.deleted_at.or(Some(now))
            } else {
                None
            };
        }
        Ok(())
    }

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()> {
        self.mark_status(id, BackupStatus::BackupDeleted)
    }

    fn get_expired(&self, backup_type: BackupType, now: DateTime<Utc>) -> anyhow::Result<Vec<Backup>> {
        Ok(self
            .lock()?
            .backups
            .iter()
            .filter(|b| b.backup_type == backup_type)
            .filter(|b| {
                b.status == BackupStatus::ToDelete
                    || (b.status == BackupStatus::Finished
                        && !b.is_deleted()
                        && b.snapshot.frequency_in_hours == 0
                        && b.snapshot.lifetime_in_days > 0
                        && b.created_at + Duration::days(i64::from(b.snapshot.lifetime_in_days))
                            < now)
            })
            .cloned()
            .collect())
    }

    fn get_scheduled(&self, backup_type: BackupType) -> anyhow::Result<Vec<Backup>> {
        Ok(self
            .lock()?
            .backups
            .iter()
            .filter(|b| {
                b.backup_type == backup_type
                    && !b.is_deleted()
                    && matches!(b.status, BackupStatus::NotStarted | BackupStatus::Prepared)
            })
            .cloned()
            .collect())
    }

    fn get_expired_mirror_revisions(
        &self,
        max_revision_lifetime_weeks: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MirrorRevision>> {
        let inner = self.lock()?;
        let mut candidates = Vec::new();
        for row in &inner.source_metadata {
            let Some(backup) = inner.backups.iter().find(|b| b.id == row.backup_id) else {
                continue;
            };
            let job = inner
                .links
                .iter()
                .find(|(metadata_id, _)| *metadata_id == row.id)
                .and_then(|(_, job_id)| inner.jobs.iter().find(|j| &j.id == job_id));
            candidates.push(RevisionCandidate {
                source_metadata_id: row.id,
                backup_id: row.backup_id.clone(),
                source: row.source.clone(),
                operation: row.operation,
                created_at: row.created_at,
                deleted: row.deleted_at.is_some(),
                job_id: job.map(|j| j.id.clone()),
                job_status: job.map(|j| j.status),
                backup_strategy: backup.strategy.clone(),
                backup_status: backup.status,
                mirror_lifetime_in_days: backup.mirror.lifetime_in_days,
                bigquery_dataset: backup.bigquery.dataset.clone(),
                target_project: backup.sink.target_project.clone(),
                target_sink: backup.sink.sink.clone(),
            });
        }
        Ok(select_expired_revisions(
            &candidates,
            max_revision_lifetime_weeks,
            now,
        ))
    }
}

fn newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

impl JobRepository for MemoryStore {
    fn add_job(&self, job: &Job) -> anyhow::Result<()> {
        self.add_jobs(std::slice::from_ref(job))
    }

    fn add_jobs(&self, jobs: &[Job]) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        let existing: HashSet<&str> = inner.jobs.iter().map(|j| j.id.as_str()).collect();
        if let Some(dup) = jobs.iter().find(|j| existing.contains(j.id.as_str())) {
            bail!("job {} already exists", dup.id);
        }
        inner.jobs.extend(jobs.iter().cloned());
        Ok(())
    }

    fn get_by_type_and_status(
        &self,
        backup_type: BackupType,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .lock()?
            .jobs
            .iter()
            .filter(|j| {
                j.job_type == backup_type && j.deleted_at.is_none() && statuses.contains(&j.status)
            })
            .cloned()
            .collect())
    }

    fn get_by_status_and_before(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Job>> {
        Ok(self
            .lock()?
            .jobs
            .iter()
            .filter(|j| {
                j.deleted_at.is_none()
                    && statuses.contains(&j.status)
                    && j.updated_at.unwrap_or(j.created_at) < cutoff
            })
            .cloned()
            .collect())
    }

    fn patch_status(&self, patch: &JobPatch) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(job) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == patch.id && j.deleted_at.is_none())
        {
            job.status = patch.status;
            job.foreign_job_id = patch.foreign_job_id.clone();
            job.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(job) = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.deleted_at.is_none())
        {
            let now = Utc::now();
            job.status = JobStatus::JobDeleted;
            job.updated_at = Some(now);
            job.deleted_at = Some(now);
        }
        Ok(())
    }

    fn get_for_backup(&self, backup_id: &str, page: JobPage) -> anyhow::Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .lock()?
            .jobs
            .iter()
            .filter(|j| j.backup_id == backup_id)
            .cloned()
            .collect();
        newest_first(&mut jobs);
        Ok(page.apply(jobs))
    }

    fn get_most_recent_for_backup(
        &self,
        backup_id: &str,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Option<Job>> {
        let mut jobs: Vec<Job> = self
            .lock()?
            .jobs
            .iter()
            .filter(|j| {
                j.backup_id == backup_id && j.deleted_at.is_none() && statuses.contains(&j.status)
            })
            .cloned()
            .collect();
        newest_first(&mut jobs);
        Ok(jobs.into_iter().next())
    }

    fn get_statistics_for_backup(&self, backup_id: &str) -> anyhow::Result<JobStatistics> {
        let mut stats = JobStatistics::new();
        for job in self.lock()?.jobs.iter().filter(|j| j.backup_id == backup_id) {
            *stats.entry(job.status).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

impl SourceMetadataRepository for MemoryStore {
    fn get_last_by_backup_id(&self, backup_id: &str) -> anyhow::Result<Vec<SourceMetadata>> {
        let inner = self.lock()?;
        let mut last: BTreeMap<&str, &SourceMetadata> = BTreeMap::new();
        for row in inner
            .source_metadata
            .iter()
            .filter(|m| m.backup_id == backup_id && m.deleted_at.is_none())
        {
            match last.get(row.source.as_str()) {
                Some(current) if (current.created_at, current.id) > (row.created_at, row.id) => {}
                _ => {
                    last.insert(row.source.as_str(), row);
                }
            }
        }
        Ok(last.into_values().cloned().collect())
    }

    fn add(&self, rows: &[NewSourceMetadata]) -> anyhow::Result<Vec<SourceMetadata>> {
        let mut inner = self.lock()?;
        let mut next_id = inner.source_metadata.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let mut added = Vec::with_capacity(rows.len());
        for row in rows {
            added.push(SourceMetadata {
                id: next_id,
                backup_id: row.backup_id.clone(),
                source: row.source.clone(),
                source_checksum: row.source_checksum.clone(),
                operation: row.operation,
                created_at: now,
                deleted_at: None,
            });
            next_id += 1;
        }
        inner.source_metadata.extend(added.iter().cloned());
        Ok(added)
    }

    fn mark_deleted(&self, id: i64) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(row) = inner
            .source_metadata
            .iter_mut()
            .find(|m| m.id == id && m.deleted_at.is_none())
        {
            row.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

impl SourceMetadataJobRepository for MemoryStore {
    fn add(&self, source_metadata_id: i64, job_id: &str) -> anyhow::Result<()> {
        self.lock()?
            .links
            .push((source_metadata_id, job_id.to_string()));
        Ok(())
    }
}

impl SourceTrashcanRepository for MemoryStore {
    fn add(&self, backup_id: &str, source: &str, time: DateTime<Utc>) -> anyhow::Result<()> {
        self.lock()?.trashcan.push(SourceTrashcan {
            backup_id: backup_id.to_string(),
            source: source.to_string(),
            created_at: time,
        });
        Ok(())
    }

    fn delete(&self, backup_id: &str, source: &str) -> anyhow::Result<()> {
        self.lock()?
            .trashcan
            .retain(|t| !(t.backup_id == backup_id && t.source == source));
        Ok(())
    }

    fn filter_existing(&self, entries: &[TrashcanEntry]) -> anyhow::Result<Vec<TrashcanEntry>> {
        let inner = self.lock()?;
        let stored: HashSet<TrashcanEntry> = inner.trashcan.iter().map(TrashcanEntry::from).collect();
        let mut seen = HashSet::new();
        Ok(entries
            .iter()
            .filter(|e| stored.contains(*e) && seen.insert((*e).clone()))
            .cloned()
            .collect())
    }

    fn get_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<SourceTrashcan>> {
        Ok(self
            .lock()?
            .trashcan
            .iter()
            .filter(|t| t.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Operation, Strategy};

    fn store_with_backup(strategy: Strategy) -> (MemoryStore, Backup) {
        let store = MemoryStore::new();
        let backup = Backup::new("b1", BackupType::BigQuery, strategy, "source-project");
        store.add_backup(&backup).unwrap();
        (store, backup)
    }

    #[test]
    fn test_metadata_ids_increase_and_last_row_wins() {
        let (store, _) = store_with_backup(Strategy::Mirror);
        let first = SourceMetadataRepository::add(
            &store,
            &[
                NewSourceMetadata::new("b1", "t1", "a", Operation::Add),
                NewSourceMetadata::new("b1", "t2", "a", Operation::Add),
            ],
        )
        .unwrap();
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);

        let second =
            SourceMetadataRepository::add(&store, &[NewSourceMetadata::new("b1", "t1", "b", Operation::Update)])
                .unwrap();
        assert_eq!(second[0].id, 3);

        let last = store.get_last_by_backup_id("b1").unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].source, "t1");
        assert_eq!(last[0].source_checksum, "b");

        SourceMetadataRepository::mark_deleted(&store, 3).unwrap();
        let last = store.get_last_by_backup_id("b1").unwrap();
        assert_eq!(last[0].source_checksum, "a");
        assert_eq!(store.source_metadata_rows("b1").unwrap().len(), 3);
    }

    #[test]
    fn test_restored_backup_is_scheduled_again() {
        let (store, _) = store_with_backup(Strategy::Mirror);
        BackupRepository::mark_deleted(&store, "b1").unwrap();
        assert!(store.get_scheduled(BackupType::BigQuery).unwrap().is_empty());

        store.mark_status("b1", BackupStatus::NotStarted).unwrap();
        let backup = store.get_backup("b1").unwrap().unwrap();
        assert_eq!(backup.status, BackupStatus::NotStarted);
        assert!(backup.deleted_at.is_none());
        assert_eq!(store.get_scheduled(BackupType::BigQuery).unwrap().len(), 1);
    }

    #[test]
    fn test_scheduled_time_requires_expected_status() {
        let (store, _) = store_with_backup(Strategy::Mirror);
        store.mark_status("b1", BackupStatus::Paused).unwrap();

        let now = Utc::now();
        let updated = store
            .update_last_scheduled_time("b1", now, BackupStatus::NotStarted, BackupStatus::Prepared)
            .unwrap();
        assert!(!updated);
        let backup = store.get_backup("b1").unwrap().unwrap();
        assert_eq!(backup.status, BackupStatus::Paused);
        assert!(backup.last_scheduled_time.is_none());

        store.mark_status("b1", BackupStatus::NotStarted).unwrap();
        assert!(store
            .update_last_scheduled_time("b1", now, BackupStatus::NotStarted, BackupStatus::Prepared)
            .unwrap());
        assert_eq!(store.get_backup("b1").unwrap().unwrap().last_scheduled_time, Some(now));
    }

    #[test]
    fn test_add_jobs_rejects_duplicates_without_partial_write() {
        let (store, _) = store_with_backup(Strategy::Mirror);
        let job = Job::new("b1", "t1", BackupType::BigQuery);
        store.add_job(&job).unwrap();

        let fresh = Job::new("b1", "t2", BackupType::BigQuery);
        assert!(store.add_jobs(&[fresh, job]).is_err());
        assert_eq!(store.get_for_backup("b1", JobPage::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_scheduled_and_expired_backups() {
        let store = MemoryStore::new();
        let mut one_shot = Backup::new("snap", BackupType::BigQuery, Strategy::Snapshot, "p");
        one_shot.status = BackupStatus::Finished;
        one_shot.snapshot.lifetime_in_days = 1;
        one_shot.created_at = Utc::now() - Duration::days(3);
        let mut to_delete = Backup::new("gone", BackupType::BigQuery, Strategy::Mirror, "p");
        to_delete.status = BackupStatus::ToDelete;
        let fresh = Backup::new("fresh", BackupType::BigQuery, Strategy::Mirror, "p");
        let bucket = Backup::new("bucket", BackupType::CloudStorage, Strategy::Mirror, "p");
        for b in [&one_shot, &to_delete, &fresh, &bucket] {
            store.add_backup(b).unwrap();
        }

        let mut expired: Vec<String> = store
            .get_expired(BackupType::BigQuery, Utc::now())
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        expired.sort();
        assert_eq!(expired, vec!["gone", "snap"]);

        let scheduled = store.get_scheduled(BackupType::BigQuery).unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, "fresh");
    }

    #[test]
    fn test_jobs_by_status_and_age() {
        let (store, _) = store_with_backup(Strategy::Mirror);
        let mut old = Job::new("b1", "t1", BackupType::BigQuery);
        old.status = JobStatus::Pending;
        old.created_at = Utc::now() - Duration::hours(5);
        let mut recent = Job::new("b1", "t2", BackupType::BigQuery);
        recent.status = JobStatus::Pending;
        store.add_jobs(&[old.clone(), recent]).unwrap();

        let stale = store
            .get_by_status_and_before(&[JobStatus::Pending], Utc::now() - Duration::hours(1))
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);

        JobRepository::mark_deleted(&store, &old.id).unwrap();
        let stats = store.get_statistics_for_backup("b1").unwrap();
        assert_eq!(stats.get(&JobStatus::Pending), Some(&1));
        assert_eq!(stats.get(&JobStatus::JobDeleted), Some(&1));
    }

    #[test]
    fn test_trashcan_filter_and_retention() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::weeks(3);
        SourceTrashcanRepository::add(&store, "b1", "a.txt", old).unwrap();
        SourceTrashcanRepository::add(&store, "b1", "b.txt", Utc::now()).unwrap();

        let existing = store
            .filter_existing(&[
                TrashcanEntry::new("b1", "a.txt"),
                TrashcanEntry::new("b1", "missing.txt"),
                TrashcanEntry::new("b1", "a.txt"),
            ])
            .unwrap();
        assert_eq!(existing, vec![TrashcanEntry::new("b1", "a.txt")]);

        let due = store.get_before(Utc::now() - Duration::weeks(2)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].source, "a.txt");

        store.delete("b1", "a.txt").unwrap();
        assert!(store.get_before(Utc::now()).unwrap().iter().all(|t| t.source != "a.txt"));
    }
}
