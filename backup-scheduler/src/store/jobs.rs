use super::{get_opt_time, get_parsed, get_time, placeholders, to_text, SqliteStore};
use backup_engine::models::{
    BackupType, ForeignJobId, Job, JobPage, JobPatch, JobStatistics, JobStatus,
};
use backup_engine::repository::JobRepository;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Row};

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get("id")?,
        backup_id: row.get("backup_id")?,
        job_type: get_parsed(row, "job_type")?,
        status: get_parsed(row, "status")?,
        source: row.get("source")?,
        foreign_job_id: ForeignJobId {
            bigquery_extract_job_id: row.get("bigquery_extract_job_id")?,
            cloudstorage_transfer_job_id: row.get("cloudstorage_transfer_job_id")?,
        },
        created_at: get_time(row, "created_at")?,
        updated_at: get_opt_time(row, "updated_at")?,
        deleted_at: get_opt_time(row, "deleted_at")?,
    })
}

fn status_names(statuses: &[JobStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl SqliteStore {
    fn query_jobs(&self, sql: &str, args: Vec<String>) -> anyhow::Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl JobRepository for SqliteStore {
    fn add_job(&self, job: &Job) -> anyhow::Result<()> {
        self.add_jobs(std::slice::from_ref(job))
    }

    fn add_jobs(&self, jobs: &[Job]) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO jobs (id, backup_id, job_type, status, source,
                    bigquery_extract_job_id, cloudstorage_transfer_job_id, created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for job in jobs {
                stmt.execute(params![
                    job.id,
                    job.backup_id,
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.source,
                    job.foreign_job_id.bigquery_extract_job_id,
                    job.foreign_job_id.cloudstorage_transfer_job_id,
                    to_text(job.created_at),
                    job.updated_at.map(to_text),
                    job.deleted_at.map(to_text),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_by_type_and_status(
        &self,
        backup_type: BackupType,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Vec<Job>> {
        let sql = format!(
            "SELECT * FROM jobs WHERE job_type = ? AND deleted_at IS NULL AND status IN ({})
             ORDER BY created_at",
            placeholders(statuses.len())
        );
        let mut args = vec![backup_type.as_str().to_string()];
        args.extend(status_names(statuses));
        self.query_jobs(&sql, args)
    }

    fn get_by_status_and_before(
        &self,
        statuses: &[JobStatus],
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Job>> {
        let sql = format!(
            "SELECT * FROM jobs WHERE deleted_at IS NULL AND status IN ({})
               AND COALESCE(updated_at, created_at) < ?
             ORDER BY created_at",
            placeholders(statuses.len())
        );
        let mut args = status_names(statuses);
        args.push(to_text(cutoff));
        self.query_jobs(&sql, args)
    }

    fn patch_status(&self, patch: &JobPatch) -> anyhow::Result<()> {
        self.conn()?.execute(
            "UPDATE jobs SET status = ?1, bigquery_extract_job_id = ?2,
                cloudstorage_transfer_job_id = ?3, updated_at = ?4
             WHERE id = ?5 AND deleted_at IS NULL",
            params![
                patch.status.as_str(),
                patch.foreign_job_id.bigquery_extract_job_id,
                patch.foreign_job_id.cloudstorage_transfer_job_id,
                to_text(Utc::now()),
                patch.id,
            ],
        )?;
        Ok(())
    }

    fn mark_deleted(&self, id: &str) -> anyhow::Result<()> {
        let now = to_text(Utc::now());
        self.conn()?.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2, deleted_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![JobStatus::JobDeleted.as_str(), now, id],
        )?;
        Ok(())
    }

    fn get_for_backup(&self, backup_id: &str, page: JobPage) -> anyhow::Result<Vec<Job>> {
        // LIMIT -1 is unbounded in SQLite
        let (limit, offset) = match page.size {
            Some(size) => (
                i64::try_from(size).unwrap_or(i64::MAX),
                i64::try_from(page.number.saturating_mul(size)).unwrap_or(i64::MAX),
            ),
            None => (-1, 0),
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE backup_id = ?1
             ORDER BY created_at DESC, updated_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![backup_id, limit, offset], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get_most_recent_for_backup(
        &self,
        backup_id: &str,
        statuses: &[JobStatus],
    ) -> anyhow::Result<Option<Job>> {
        let sql = format!(
            "SELECT * FROM jobs WHERE backup_id = ? AND deleted_at IS NULL AND status IN ({})
             ORDER BY created_at DESC, updated_at DESC
             LIMIT 1",
            placeholders(statuses.len())
        );
        let mut args = vec![backup_id.to_string()];
        args.extend(status_names(statuses));
        Ok(self.query_jobs(&sql, args)?.into_iter().next())
    }

    fn get_statistics_for_backup(&self, backup_id: &str) -> anyhow::Result<JobStatistics> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) AS total FROM jobs WHERE backup_id = ? GROUP BY status")?;
        let rows = stmt.query_map(params![backup_id], |row| {
            Ok((get_parsed::<JobStatus>(row, "status")?, row.get::<_, i64>("total")?))
        })?;
        let mut stats = JobStatistics::new();
        for row in rows {
            let (status, total) = row?;
            stats.insert(status, u64::try_from(total)?);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::store;
    use backup_engine::models::{Backup, Strategy};
    use backup_engine::repository::BackupRepository;
    use chrono::Duration;

    fn seeded() -> anyhow::Result<(tempfile::TempDir, SqliteStore)> {
        let (dir, store) = store()?;
        store.add_backup(&Backup::new("b1", BackupType::BigQuery, Strategy::Mirror, "p"))?;
        Ok((dir, store))
    }

    #[test]
    fn test_add_jobs_is_atomic() -> anyhow::Result<()> {
        let (_dir, store) = seeded()?;
        let job = Job::new("b1", "t1", BackupType::BigQuery);
        store.add_job(&job)?;

        let fresh = Job::new("b1", "t2", BackupType::BigQuery);
        assert!(store.add_jobs(&[fresh, job]).is_err());
        assert_eq!(store.get_for_backup("b1", JobPage::all())?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_queries_by_type_status_and_age() -> anyhow::Result<()> {
        let (_dir, store) = seeded()?;
        let mut old = Job::new("b1", "t1", BackupType::BigQuery);
        old.status = JobStatus::Pending;
        old.created_at = Utc::now() - Duration::hours(10);
        let fresh = Job::new("b1", "t2", BackupType::BigQuery);
        store.add_jobs(&[old.clone(), fresh.clone()])?;

        let next = store.get_by_type_and_status(BackupType::BigQuery, &[JobStatus::NotScheduled])?;
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, fresh.id);
        assert!(store
            .get_by_type_and_status(BackupType::CloudStorage, &[JobStatus::NotScheduled])?
            .is_empty());

        let stale = store.get_by_status_and_before(
            &[JobStatus::Pending, JobStatus::NotScheduled],
            Utc::now() - Duration::hours(1),
        )?;
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
        Ok(())
    }

    #[test]
    fn test_patch_delete_and_statistics() -> anyhow::Result<()> {
        let (_dir, store) = seeded()?;
        let a = Job::new("b1", "t1", BackupType::CloudStorage);
        let b = Job::new("b1", "t2", BackupType::CloudStorage);
        store.add_jobs(&[a.clone(), b.clone()])?;

        store.patch_status(&JobPatch {
            id: a.id.clone(),
            status: JobStatus::FinishedOk,
            foreign_job_id: ForeignJobId {
                bigquery_extract_job_id: None,
                cloudstorage_transfer_job_id: Some("transferJobs/1".into()),
            },
        })?;
        JobRepository::mark_deleted(&store, &b.id)?;

        let recent = store
            .get_most_recent_for_backup("b1", &[JobStatus::FinishedOk, JobStatus::FinishedError])?
            .unwrap();
        assert_eq!(recent.id, a.id);
        assert_eq!(
            recent.foreign_job_id.cloudstorage_transfer_job_id.as_deref(),
            Some("transferJobs/1")
        );

        let stats = store.get_statistics_for_backup("b1")?;
        assert_eq!(stats.get(&JobStatus::FinishedOk), Some(&1));
        assert_eq!(stats.get(&JobStatus::JobDeleted), Some(&1));
        Ok(())
    }

    #[test]
    fn test_page_past_the_end_is_empty() -> anyhow::Result<()> {
        let (_dir, store) = seeded()?;
        store.add_job(&Job::new("b1", "t1", BackupType::BigQuery))?;

        let page = store.get_for_backup("b1", JobPage { size: Some(10), number: usize::MAX })?;
        assert!(page.is_empty());
        Ok(())
    }

    #[test]
    fn test_paging_newest_first() -> anyhow::Result<()> {
        let (_dir, store) = seeded()?;
        let jobs: Vec<Job> = (0..5)
            .map(|i| {
                let mut job = Job::new("b1", &format!("t{i}"), BackupType::BigQuery);
                job.created_at = Utc::now() - Duration::minutes(i);
                job
            })
            .collect();
        store.add_jobs(&jobs)?;

        let page = store.get_for_backup("b1", JobPage { size: Some(2), number: 1 })?;
        let sources: Vec<_> = page.iter().map(|j| j.source.as_str()).collect();
        assert_eq!(sources, vec!["t2", "t3"]);
        Ok(())
    }
}
