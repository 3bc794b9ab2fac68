//! Resource enumeration: turns a backup's selectors into the flat list of
//! source units that are compared and copied.

use crate::models::Backup;
use crate::provider::{is_partition_decorated, BigQueryClient, ProviderResult, Resource};
use crate::utils::{ensure_active, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tables and partitions of a BigQuery backup, sorted and unique by name.
///
/// Tables that vanish between listing and fetching are skipped; every other
/// provider failure aborts the enumeration.
pub fn enumerate_tables(
    cancel: &CancellationToken,
    client: &dyn BigQueryClient,
    backup: &Backup,
) -> Result<Vec<Resource>> {
    let dataset = backup.bigquery.dataset.as_str();
    let names = tables_to_inspect(cancel, client, backup)?;

    let mut resources = Vec::new();
    for table in &names {
        ensure_active(cancel)?;
        match expand_table(client, dataset, table) {
            Ok(found) => resources.extend(found),
            Err(e) if e.is_not_found() => {
                info!(backup_id = %backup.id, dataset, table = %table, "table not found, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    resources.sort_by(|a, b| a.name.cmp(&b.name));
    resources.dedup_by(|a, b| a.name == b.name);
    debug!(backup_id = %backup.id, tables = names.len(), resources = resources.len(), "enumerated tables");
    Ok(resources)
}

/// The single unit of a Cloud Storage backup: its bucket.
pub fn enumerate_bucket(backup: &Backup) -> Vec<Resource> {
    vec![Resource::new(backup.cloud_storage.bucket.clone(), "", 0)]
}

fn tables_to_inspect(
    cancel: &CancellationToken,
    client: &dyn BigQueryClient,
    backup: &Backup,
) -> Result<Vec<String>> {
    let options = &backup.bigquery;
    if !options.tables.is_empty() {
        return Ok(options.tables.clone());
    }

    ensure_active(cancel)?;
    let listed = client.get_tables_in_dataset(&options.dataset)?;
    Ok(listed
        .into_iter()
        .filter(|t| !options.excluded_tables.contains(t))
        .collect())
}

fn expand_table(client: &dyn BigQueryClient, dataset: &str, table: &str) -> ProviderResult<Vec<Resource>> {
    if is_partition_decorated(table) || !client.has_table_partitions(dataset, table)? {
        return Ok(vec![client.get_table(dataset, table)?]);
    }
    client.get_table_partitions(dataset, table)
}
