//! Job read and write operations.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{from_unix, to_unix, JobDb};
use super::types::{Job, JobId, JobSettings, JobStatus, NewJob, Recurrence};
use crate::model::{ChannelRef, Destination};

const JOB_COLUMNS: &str = r#"
    id, channel, spreadsheet_id, tab, recurrence, status,
    last_run_at, next_due_at, last_error, created_at, updated_at, settings_json
"#;

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: i64 = row.get("id");
    let channel: String = row.get("channel");
    let spreadsheet_id: String = row.get("spreadsheet_id");
    let tab: String = row.get("tab");
    let recurrence: String = row.get("recurrence");
    let status: String = row.get("status");
    let last_run_at: Option<i64> = row.get("last_run_at");
    let next_due_at: Option<i64> = row.get("next_due_at");
    let last_error: Option<String> = row.get("last_error");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");
    let settings_json: Option<String> = row.get("settings_json");

    let settings = settings_json
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::from_str::<JobSettings>(s))
        .transpose()
        .with_context(|| format!("job {id}: settings"))?
        .unwrap_or_default();

    Ok(Job {
        id,
        channel: ChannelRef::parse(&channel).with_context(|| format!("job {id}: channel"))?,
        destination: Destination {
            spreadsheet_id,
            tab,
        },
        recurrence: recurrence
            .parse::<Recurrence>()
            .map_err(|e| anyhow!("job {id}: {e}"))?,
        settings,
        status: JobStatus::from_db(&status),
        last_run_at: last_run_at.map(from_unix),
        next_due_at: next_due_at.map(from_unix),
        last_error,
        created_at: from_unix(created_at),
        updated_at: from_unix(updated_at),
    })
}

impl JobDb {
    /// Insert a new pending job. Recurring jobs are due immediately; manual
    /// jobs have no due time.
    pub async fn add_job(&self, new: &NewJob, now: DateTime<Utc>) -> Result<JobId> {
        let now_ts = to_unix(now);
        let next_due = (new.recurrence != Recurrence::Manual).then_some(now_ts);
        let settings_json = serde_json::to_string(&new.settings)?;

        let row_id = sqlx::query(
            r#"
            INSERT INTO jobs (
                channel, spreadsheet_id, tab, recurrence, status,
                last_run_at, next_due_at, last_error, created_at, updated_at, settings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, ?7, ?8, ?9)
            "#,
        )
        .bind(new.channel.to_string())
        .bind(&new.destination.spreadsheet_id)
        .bind(&new.destination.tab)
        .bind(new.recurrence.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(next_due)
        .bind(now_ts)
        .bind(now_ts)
        .bind(settings_json)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(
            job_id = row_id,
            channel = %new.channel,
            destination = %new.destination,
            "job added"
        );
        Ok(row_id)
    }

    /// All jobs, smallest id first.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn find_job(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Write every mutable field of `job`, inserting it if the id is new.
    pub async fn upsert_job(&self, job: &Job) -> Result<()> {
        let settings_json = serde_json::to_string(&job.settings)?;
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, channel, spreadsheet_id, tab, recurrence, status,
                last_run_at, next_due_at, last_error, created_at, updated_at, settings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                channel = excluded.channel,
                spreadsheet_id = excluded.spreadsheet_id,
                tab = excluded.tab,
                recurrence = excluded.recurrence,
                status = excluded.status,
                last_run_at = excluded.last_run_at,
                next_due_at = excluded.next_due_at,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at,
                settings_json = excluded.settings_json
            "#,
        )
        .bind(job.id)
        .bind(job.channel.to_string())
        .bind(&job.destination.spreadsheet_id)
        .bind(&job.destination.tab)
        .bind(job.recurrence.as_str())
        .bind(job.status.as_str())
        .bind(job.last_run_at.map(to_unix))
        .bind(job.next_due_at.map(to_unix))
        .bind(&job.last_error)
        .bind(to_unix(job.created_at))
        .bind(to_unix(job.updated_at))
        .bind(settings_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically move a job to `running`. Returns false when the job is
    /// missing or already running, so two workers never run the same job.
    pub async fn claim_job(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        let now_ts = to_unix(now);
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running',
                last_run_at = ?1,
                updated_at = ?1
            WHERE id = ?2 AND status != 'running'
            "#,
        )
        .bind(now_ts)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Remove a job. Returns true if a row was deleted. Run history is kept.
    pub async fn remove_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
