use super::{get_time, to_text, SqliteStore};
use backup_engine::models::{SourceTrashcan, TrashcanEntry};
use backup_engine::repository::SourceTrashcanRepository;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use std::collections::HashSet;

fn row_to_trashcan(row: &Row) -> rusqlite::Result<SourceTrashcan> {
    Ok(SourceTrashcan {
        backup_id: row.get("backup_id")?,
        source: row.get("source")?,
        created_at: get_time(row, "created_at")?,
    })
}

impl SourceTrashcanRepository for SqliteStore {
    fn add(&self, backup_id: &str, source: &str, time: DateTime<Utc>) -> anyhow::Result<()> {
        self.conn()?.execute(
            "INSERT INTO source_trashcan (backup_id, source, created_at) VALUES (?1, ?2, ?3)",
            params![backup_id, source, to_text(time)],
        )?;
        Ok(())
    }

    fn delete(&self, backup_id: &str, source: &str) -> anyhow::Result<()> {
        self.conn()?.execute(
            "DELETE FROM source_trashcan WHERE backup_id = ?1 AND source = ?2",
            params![backup_id, source],
        )?;
        Ok(())
    }

    fn filter_existing(&self, entries: &[TrashcanEntry]) -> anyhow::Result<Vec<TrashcanEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT EXISTS(SELECT 1 FROM source_trashcan WHERE backup_id = ?1 AND source = ?2)",
        )?;
        let mut seen = HashSet::new();
        let mut existing = Vec::new();
        for entry in entries {
            if seen.contains(entry) {
                continue;
            }
            let found: bool = stmt.query_row(params![entry.backup_id, entry.source], |row| row.get(0))?;
            if found {
                existing.push(entry.clone());
            }
            seen.insert(entry.clone());
        }
        Ok(existing)
    }

    fn get_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<SourceTrashcan>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM source_trashcan WHERE created_at < ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![to_text(cutoff)], row_to_trashcan)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
