use super::{get_opt_time, get_parsed, get_time, to_text, SqliteStore};
use backup_engine::models::{NewSourceMetadata, SourceMetadata};
use backup_engine::repository::{SourceMetadataJobRepository, SourceMetadataRepository};
use chrono::Utc;
use rusqlite::{params, Row};

fn row_to_source_metadata(row: &Row) -> rusqlite::Result<SourceMetadata> {
    Ok(SourceMetadata {
        id: row.get("id")?,
        backup_id: row.get("backup_id")?,
        source: row.get("source")?,
        source_checksum: row.get("source_checksum")?,
        operation: get_parsed(row, "operation")?,
        created_at: get_time(row, "created_at")?,
        deleted_at: get_opt_time(row, "deleted_at")?,
    })
}

impl SourceMetadataRepository for SqliteStore {
    fn get_last_by_backup_id(&self, backup_id: &str) -> anyhow::Result<Vec<SourceMetadata>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sm.* FROM source_metadata sm
             WHERE sm.backup_id = ?1 AND sm.deleted_at IS NULL
               AND sm.id = (
                 SELECT latest.id FROM source_metadata latest
                 WHERE latest.backup_id = sm.backup_id AND latest.source = sm.source
                   AND latest.deleted_at IS NULL
                 ORDER BY latest.created_at DESC, latest.id DESC
                 LIMIT 1)
             ORDER BY sm.source",
        )?;
        let rows = stmt.query_map(params![backup_id], row_to_source_metadata)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn add(&self, rows: &[NewSourceMetadata]) -> anyhow::Result<Vec<SourceMetadata>> {
        let created_at = Utc::now();
        let created_text = to_text(created_at);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut added = Vec::with_capacity(rows.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO source_metadata (backup_id, source, source_checksum, operation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                let id = stmt.insert(params![
                    row.backup_id,
                    row.source,
                    row.source_checksum,
                    row.operation.as_str(),
                    created_text,
                ])?;
                added.push(SourceMetadata {
                    id,
                    backup_id: row.backup_id.clone(),
                    source: row.source.clone(),
                    source_checksum: row.source_checksum.clone(),
                    operation: row.operation,
                    created_at,
                    deleted_at: None,
                });
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn mark_deleted(&self, id: i64) -> anyhow::Result<()> {
        self.conn()?.execute(
            "UPDATE source_metadata SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![to_text(Utc::now()), id],
        )?;
        Ok(())
    }
}

impl SourceMetadataJobRepository for SqliteStore {
    fn add(&self, source_metadata_id: i64, job_id: &str) -> anyhow::Result<()> {
        self.conn()?.execute(
            "INSERT INTO source_metadata_jobs (source_metadata_id, job_id) VALUES (?1, ?2)",
            params![source_metadata_id, job_id],
        )?;
        Ok(())
    }
}
