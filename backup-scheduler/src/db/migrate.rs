use crate::db::connection::DbPool;
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
  id TEXT PRIMARY KEY,
  backup_type TEXT NOT NULL CHECK(backup_type IN ('BigQuery','CloudStorage')),
  strategy TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'NotStarted' CHECK(status IN ('NotStarted','Prepared','Finished','Paused','ToDelete','BackupDeleted')),
  source_project TEXT NOT NULL,
  target_project TEXT NOT NULL DEFAULT '',
  target_region TEXT NOT NULL DEFAULT '',
  target_sink TEXT NOT NULL DEFAULT '',
  target_storage_class TEXT NOT NULL DEFAULT '',
  target_archive_ttm INTEGER NOT NULL DEFAULT 0,
  snapshot_lifetime_in_days INTEGER NOT NULL DEFAULT 0,
  snapshot_frequency_in_hours INTEGER NOT NULL DEFAULT 0,
  mirror_lifetime_in_days INTEGER NOT NULL DEFAULT 0,
  bigquery_dataset TEXT NOT NULL DEFAULT '',
  bigquery_tables TEXT NOT NULL DEFAULT '[]',
  bigquery_excluded_tables TEXT NOT NULL DEFAULT '[]',
  cloudstorage_bucket TEXT NOT NULL DEFAULT '',
  cloudstorage_include_path TEXT NOT NULL DEFAULT '[]',
  cloudstorage_exclude_path TEXT NOT NULL DEFAULT '[]',
  last_scheduled_time TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS jobs (
  id TEXT PRIMARY KEY,
  backup_id TEXT NOT NULL REFERENCES backups(id) ON DELETE CASCADE,
  job_type TEXT NOT NULL CHECK(job_type IN ('BigQuery','CloudStorage')),
  status TEXT NOT NULL DEFAULT 'NotScheduled',
  source TEXT NOT NULL,
  bigquery_extract_job_id TEXT,
  cloudstorage_transfer_job_id TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS source_metadata (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  backup_id TEXT NOT NULL REFERENCES backups(id) ON DELETE CASCADE,
  source TEXT NOT NULL,
  source_checksum TEXT NOT NULL,
  operation TEXT NOT NULL CHECK(operation IN ('Add','Update','Delete')),
  created_at TEXT NOT NULL,
  deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS source_metadata_jobs (
  source_metadata_id INTEGER NOT NULL REFERENCES source_metadata(id) ON DELETE CASCADE,
  job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
  PRIMARY KEY (source_metadata_id, job_id)
);

CREATE TABLE IF NOT EXISTS source_trashcan (
  backup_id TEXT NOT NULL,
  source TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_backup_id ON jobs(backup_id);
CREATE INDEX IF NOT EXISTS idx_jobs_type_status ON jobs(job_type, status);
CREATE INDEX IF NOT EXISTS idx_source_metadata_backup_source ON source_metadata(backup_id, source);
CREATE INDEX IF NOT EXISTS idx_source_trashcan_entry ON source_trashcan(backup_id, source);
"#;

fn has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns.iter().any(|c| c == column))
}

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    // Idempotent migrations for existing databases
    if !has_column(&conn, "backups", "last_cleanup_time")? {
        conn.execute_batch("ALTER TABLE backups ADD COLUMN last_cleanup_time TEXT")?;
    }

    tracing::info!("[DB] Migration complete");
    Ok(())
}
