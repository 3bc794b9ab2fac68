//! Fakes for unit tests.

use crate::provider::{
    partition_name, BigQueryClient, CloudStorageClient, ProviderResult, Resource,
};
use crate::models::{BackupType, Job, JobPage, JobPatch, JobStatistics, JobStatus};
use crate::repository::{JobRepository, MemoryStore, SourceMetadataJobRepository};
use crate::utils::ProviderError;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

enum FakeTable {
    Plain(String),
    Partitioned(Vec<(String, String)>),
}

/// In-memory dataset. Checksums can be changed between passes.
#[derive(Default)]
pub struct FakeBigQuery {
    tables: Mutex<BTreeMap<String, FakeTable>>,
    broken: HashSet<String>,
}

impl FakeBigQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, checksum: &str) -> Self {
        self.set_table(name, checksum);
        self
    }

    pub fn with_partitioned(self, name: &str, partitions: &[(&str, &str)]) -> Self {
        self.set_partitions(name, partitions);
        self
    }

    /// Listed in the dataset, but every lookup fails with a non-404 error.
    pub fn with_broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    pub fn set_table(&self, name: &str, checksum: &str) {
        self.tables
            .lock()
            .unwrap()
            .insert(name.to_string(), FakeTable::Plain(checksum.to_string()));
    }

    pub fn set_partitions(&self, name: &str, partitions: &[(&str, &str)]) {
        let partitions = partitions
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        self.tables
            .lock()
            .unwrap()
            .insert(name.to_string(), FakeTable::Partitioned(partitions));
    }

    pub fn remove_table(&self, name: &str) {
        self.tables.lock().unwrap().remove(name);
    }

    fn check_broken(&self, table: &str) -> ProviderResult<()> {
        let base = table.split('$').next().unwrap_or(table);
        if self.broken.contains(base) {
            return Err(ProviderError::Other(anyhow!("backend error for {table}")));
        }
        Ok(())
    }
}

impl BigQueryClient for FakeBigQuery {
    fn get_tables_in_dataset(&self, _dataset: &str) -> ProviderResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        names.extend(self.broken.iter().cloned());
        Ok(names)
    }

    fn get_table(&self, _dataset: &str, table: &str) -> ProviderResult<Resource> {
        self.check_broken(table)?;
        let tables = self.tables.lock().unwrap();
        let (base, partition) = match table.split_once('$') {
            Some((base, partition)) => (base, Some(partition)),
            None => (table, None),
        };
        match (tables.get(base), partition) {
            (Some(FakeTable::Plain(checksum)), None) => Ok(Resource::new(table, checksum.clone(), 10)),
            (Some(FakeTable::Partitioned(parts)), Some(partition)) => parts
                .iter()
                .find(|(p, _)| p == partition)
                .map(|(_, c)| Resource::new(table, c.clone(), 10))
                .ok_or_else(|| ProviderError::NotFound(table.to_string())),
            (Some(FakeTable::Partitioned(_)), None) => Ok(Resource::new(table, "partitioned", 0)),
            _ => Err(ProviderError::NotFound(table.to_string())),
        }
    }

    fn has_table_partitions(&self, _dataset: &str, table: &str) -> ProviderResult<bool> {
        self.check_broken(table)?;
        match self.tables.lock().unwrap().get(table) {
            Some(FakeTable::Partitioned(_)) => Ok(true),
            Some(FakeTable::Plain(_)) => Ok(false),
            None => Err(ProviderError::NotFound(table.to_string())),
        }
    }

    fn get_table_partitions(&self, _dataset: &str, table: &str) -> ProviderResult<Vec<Resource>> {
        self.check_broken(table)?;
        match self.tables.lock().unwrap().get(table) {
            Some(FakeTable::Partitioned(parts)) => Ok(parts
                .iter()
                .map(|(p, c)| Resource::new(partition_name(table, p), c.clone(), 10))
                .collect()),
            _ => Err(ProviderError::NotFound(table.to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeCloudStorage {
    buckets: HashSet<String>,
}

impl FakeCloudStorage {
    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.buckets.insert(bucket.to_string());
        self
    }
}

impl CloudStorageClient for FakeCloudStorage {
    fn does_bucket_exist(&self, _project: &str, bucket: &str) -> ProviderResult<bool> {
        Ok(self.buckets.contains(bucket))
    }
}

/// Job store whose writes always fail; reads and deletes go to `inner`.
pub struct FailingJobs {
    inner: Arc<MemoryStore>,
}

impl FailingJobs {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

impl JobRepository for FailingJobs {
    fn add_job(&self, _job: &Job) -> anyhow::Result<()> {
        Err(anyhow!("job table unavailable"))
    }

    fn add_jobs(&self, _jobs: &[Job]) -> anyhow::Result<()> {
        Err(anyhow!("job table unavailable"))
    }

    fn get_by_type_and_status(
        &self,
        backup_type: BackupType,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Vec<Job>> {
        self.inner.get_by_type_and_status(backup_type, statuses)
    }

    fn get_by_status_and_before(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Job>> {
        self.inner.get_by_status_and_before(statuses, cutoff)
    }

    fn patch_status(&self, patch: &JobPatch) -> anyhow::Result<()> {
        self.inner.patch_status(patch)
    }

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()> {
        JobRepository::mark_deleted(self.inner.as_ref(), id)
    }

    fn get_for_backup(&self, backup_id: &str, page: JobPage) -> anyhow::Result<Vec<Job>> {
        self.inner.get_for_backup(backup_id, page)
    }

    fn get_most_recent_for_backup(
        &self,
        backup_id: &str,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Option<Job>> {
        self.inner.get_most_recent_for_backup(backup_id, statuses)
    }

    fn get_statistics_for_backup(&self, backup_id: &str) -> anyhow::Result<JobStatistics> {
        self.inner.get_statistics_for_backup(backup_id)
    }
}

pub struct FailingLinks;

impl SourceMetadataJobRepository for FailingLinks {
    fn add(&self, _source_metadata_id: i64, _job_id: &str) -> anyhow::Result<()> {
        Err(anyhow!("link table unavailable"))
    }
}
