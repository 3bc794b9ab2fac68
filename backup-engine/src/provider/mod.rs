//! Capability interfaces of the cloud resource providers.
//!
//! The engine never talks to a cloud SDK directly; embedders hand it
//! implementations of these traits, usually through a [`ProviderFactory`].

use crate::utils::ProviderError;
use std::sync::Arc;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// A source unit (table, partition or bucket) as observed right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    /// Provider content fingerprint (ETag or similar).
    pub checksum: String,
    pub size_in_bytes: u64,
}

impl Resource {
    pub fn new(name: impl Into<String>, checksum: impl Into<String>, size_in_bytes: u64) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
            size_in_bytes,
        }
    }
}

pub trait BigQueryClient: Send + Sync {
    /// Names of all tables in the dataset.
    fn get_tables_in_dataset(&self, dataset: &str) -> ProviderResult<Vec<String>>;

    /// Metadata of one table or one partition (`table$YYYYMMDD`).
    fn get_table(&self, dataset: &str, table: &str) -> ProviderResult<Resource>;

    fn has_table_partitions(&self, dataset: &str, table: &str) -> ProviderResult<bool>;

    /// One resource per existing partition, named with the partition decorator.
    fn get_table_partitions(&self, dataset: &str, table: &str) -> ProviderResult<Vec<Resource>>;
}

pub trait CloudStorageClient: Send + Sync {
    fn does_bucket_exist(&self, project: &str, bucket: &str) -> ProviderResult<bool>;
}

/// Builds provider clients for one backup pass.
pub trait ProviderFactory: Send + Sync {
    fn bigquery(
        &self,
        source_project: &str,
        target_project: &str,
    ) -> anyhow::Result<Arc<dyn BigQueryClient>>;

    fn cloud_storage(&self, target_project: &str) -> anyhow::Result<Arc<dyn CloudStorageClient>>;
}

const PARTITION_DECORATOR: char = '$';

/// True for names addressing a single partition, e.g. `events$20240101`.
pub fn is_partition_decorated(name: &str) -> bool {
    name.contains(PARTITION_DECORATOR)
}

/// `table$partition`
pub fn partition_name(table: &str, partition: &str) -> String {
    format!("{table}{PARTITION_DECORATOR}{partition}")
}
