use super::{get_json_list, get_opt_time, get_parsed, get_time, to_text, SqliteStore};
use backup_engine::models::{
    Backup, BackupStatus, BackupType, BigQueryOptions, CloudStorageOptions, MirrorOptions,
    MirrorRevision, SinkOptions, SnapshotOptions, Strategy,
};
use backup_engine::repository::revisions::{select_expired_revisions, RevisionCandidate};
use backup_engine::repository::BackupRepository;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Params, Row};

fn row_to_backup(row: &Row) -> rusqlite::Result<Backup> {
    let strategy: String = row.get("strategy")?;
    Ok(Backup {
        id: row.get("id")?,
        backup_type: get_parsed(row, "backup_type")?,
        strategy: Strategy::from(strategy.as_str()),
        status: get_parsed(row, "status")?,
        source_project: row.get("source_project")?,
        sink: SinkOptions {
            target_project: row.get("target_project")?,
            region: row.get("target_region")?,
            sink: row.get("target_sink")?,
            storage_class: row.get("target_storage_class")?,
            archive_ttm: row.get("target_archive_ttm")?,
        },
        snapshot: SnapshotOptions {
            lifetime_in_days: row.get("snapshot_lifetime_in_days")?,
            frequency_in_hours: row.get("snapshot_frequency_in_hours")?,
        },
        mirror: MirrorOptions {
            lifetime_in_days: row.get("mirror_lifetime_in_days")?,
        },
        bigquery: BigQueryOptions {
            dataset: row.get("bigquery_dataset")?,
            tables: get_json_list(row, "bigquery_tables")?,
            excluded_tables: get_json_list(row, "bigquery_excluded_tables")?,
        },
        cloud_storage: CloudStorageOptions {
            bucket: row.get("cloudstorage_bucket")?,
            include_path: get_json_list(row, "cloudstorage_include_path")?,
            exclude_path: get_json_list(row, "cloudstorage_exclude_path")?,
        },
        last_scheduled_time: get_opt_time(row, "last_scheduled_time")?,
        last_cleanup_time: get_opt_time(row, "last_cleanup_time")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_opt_time(row, "updated_at")?,
        deleted_at: get_opt_time(row, "deleted_at")?,
    })
}

fn row_to_candidate(row: &Row) -> rusqlite::Result<RevisionCandidate> {
    let strategy: String = row.get("strategy")?;
    let job_status: Option<String> = row.get("job_status")?;
    let job_status = match job_status {
        Some(_) => Some(get_parsed(row, "job_status")?),
        None => None,
    };
    Ok(RevisionCandidate {
        source_metadata_id: row.get("id")?,
        backup_id: row.get("backup_id")?,
        source: row.get("source")?,
        operation: get_parsed(row, "operation")?,
        created_at: get_time(row, "created_at")?,
        deleted: get_opt_time(row, "deleted_at")?.is_some(),
        job_id: row.get("job_id")?,
        job_status,
        backup_strategy: Strategy::from(strategy.as_str()),
        backup_status: get_parsed(row, "backup_status")?,
        mirror_lifetime_in_days: row.get("mirror_lifetime_in_days")?,
        bigquery_dataset: row.get("bigquery_dataset")?,
        target_project: row.get("target_project")?,
        target_sink: row.get("target_sink")?,
    })
}

impl SqliteStore {
    fn query_backups<P: Params>(&self, sql: &str, args: P) -> anyhow::Result<Vec<Backup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, row_to_backup)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl BackupRepository for SqliteStore {
    fn add_backup(&self, backup: &Backup) -> anyhow::Result<Backup> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backups (id, backup_type, strategy, status, source_project,
                target_project, target_region, target_sink, target_storage_class, target_archive_ttm,
                snapshot_lifetime_in_days, snapshot_frequency_in_hours, mirror_lifetime_in_days,
                bigquery_dataset, bigquery_tables, bigquery_excluded_tables,
                cloudstorage_bucket, cloudstorage_include_path, cloudstorage_exclude_path,
                last_scheduled_time, last_cleanup_time, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            params![
                backup.id,
                backup.backup_type.as_str(),
                backup.strategy.as_str(),
                backup.status.as_str(),
                backup.source_project,
                backup.sink.target_project,
                backup.sink.region,
                backup.sink.sink,
                backup.sink.storage_class,
                backup.sink.archive_ttm,
                backup.snapshot.lifetime_in_days,
                backup.snapshot.frequency_in_hours,
                backup.mirror.lifetime_in_days,
                backup.bigquery.dataset,
                serde_json::to_string(&backup.bigquery.tables)?,
                serde_json::to_string(&backup.bigquery.excluded_tables)?,
                backup.cloud_storage.bucket,
                serde_json::to_string(&backup.cloud_storage.include_path)?,
                serde_json::to_string(&backup.cloud_storage.exclude_path)?,
                backup.last_scheduled_time.map(to_text),
                backup.last_cleanup_time.map(to_text),
                to_text(backup.created_at),
                backup.updated_at.map(to_text),
                backup.deleted_at.map(to_text),
            ],
        )?;
        self.get_backup(&backup.id)?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created backup"))
    }

    fn get_backup(&self, id: &str) -> anyhow::Result<Option<Backup>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT * FROM backups WHERE id = ?", params![id], row_to_backup)
            .optional()?)
    }

    fn update_last_scheduled_time(
        &self,
        id: &str,
        time: DateTime<Utc>,
        expected: BackupStatus,
        status: BackupStatus,
    ) -> anyhow::Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE backups SET last_scheduled_time = ?1, status = ?2, updated_at = ?3
             WHERE id = ?4 AND deleted_at IS NULL AND status = ?5",
            params![
                to_text(time),
                status.as_str(),
                to_text(Utc::now()),
                id,
                expected.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    fn update_last_cleanup_time(&self, id: &str, time: DateTime<Utc>) -> anyhow::Result<()> {
        self.conn()?.execute(
            "UPDATE backups SET last_cleanup_time = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![to_text(time), to_text(Utc::now()), id],
        )?;
        Ok(())
    }

    fn mark_status(&self, id: &str, status: BackupStatus) -> anyhow::Result<()> {
        let now = to_text(Utc::now());
        let deleted = status == BackupStatus::BackupDeleted;
        // Any other status restores the backup.
        self.conn()?.execute(
            "UPDATE backups SET status = ?1, updated_at = ?2,
                deleted_at = CASE WHEN ?3 THEN COALESCE(deleted_at, ?2) ELSE NULL END
             WHERE id = ?4",
            params![status.as_str(), now, deleted, id],
        )?;
        Ok(())
    }

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()> {
        self.mark_status(id, BackupStatus::BackupDeleted)
    }

    fn get_expired(&self, backup_type: BackupType, now: DateTime<Utc>) -> anyhow::Result<Vec<Backup>> {
        let candidates = self.query_backups(
            "SELECT * FROM backups
             WHERE backup_type = ?1
               AND (status = 'ToDelete'
                    OR (status = 'Finished' AND deleted_at IS NULL
                        AND snapshot_frequency_in_hours = 0 AND snapshot_lifetime_in_days > 0))
             ORDER BY created_at",
            params![backup_type.as_str()],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|b| {
                b.status == BackupStatus::ToDelete
                    || b.created_at + Duration::days(i64::from(b.snapshot.lifetime_in_days)) < now
            })
            .collect())
    }

    fn get_scheduled(&self, backup_type: BackupType) -> anyhow::Result<Vec<Backup>> {
        self.query_backups(
            "SELECT * FROM backups
             WHERE backup_type = ?1 AND deleted_at IS NULL AND status IN ('NotStarted', 'Prepared')
             ORDER BY created_at",
            params![backup_type.as_str()],
        )
    }

    fn get_expired_mirror_revisions(
        &self,
        max_revision_lifetime_weeks: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MirrorRevision>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sm.id, sm.backup_id, sm.source, sm.operation, sm.created_at, sm.deleted_at,
                    j.id AS job_id, j.status AS job_status,
                    b.strategy, b.status AS backup_status, b.mirror_lifetime_in_days,
                    b.bigquery_dataset, b.target_project, b.target_sink
             FROM source_metadata sm
             JOIN backups b ON b.id = sm.backup_id
             LEFT JOIN source_metadata_jobs smj ON smj.source_metadata_id = sm.id
             LEFT JOIN jobs j ON j.id = smj.job_id
             ORDER BY sm.id",
        )?;
        let candidates = stmt
            .query_map([], row_to_candidate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(select_expired_revisions(
            &candidates,
            max_revision_lifetime_weeks,
            now,
        ))
    }
}
