//! Run history and per-destination written video ids.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::db::{from_unix, to_unix, JobDb};
use super::types::{JobId, SyncResult};
use crate::model::Destination;

impl JobDb {
    pub async fn insert_run(&self, result: &SyncResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                job_id, started_at, duration_ms, videos_fetched, videos_written,
                api_calls, quota_units, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(result.job_id)
        .bind(to_unix(result.started_at))
        .bind(i64::try_from(result.duration.as_millis()).unwrap_or(i64::MAX))
        .bind(result.videos_fetched as i64)
        .bind(result.videos_written as i64)
        .bind(i64::from(result.api_calls))
        .bind(i64::try_from(result.quota_units).unwrap_or(i64::MAX))
        .bind(&result.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs of a job, newest first.
    pub async fn list_runs(&self, job_id: JobId, limit: usize) -> Result<Vec<SyncResult>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, started_at, duration_ms, videos_fetched, videos_written,
                   api_calls, quota_units, error
            FROM sync_runs
            WHERE job_id = ?1
            ORDER BY started_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(job_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let started_at: i64 = row.get("started_at");
            let duration_ms: i64 = row.get("duration_ms");
            let videos_fetched: i64 = row.get("videos_fetched");
            let videos_written: i64 = row.get("videos_written");
            let api_calls: i64 = row.get("api_calls");
            let quota_units: i64 = row.get("quota_units");
            out.push(SyncResult {
                job_id: row.get("job_id"),
                started_at: from_unix(started_at),
                videos_fetched: videos_fetched.max(0) as usize,
                videos_written: videos_written.max(0) as usize,
                api_calls: u32::try_from(api_calls).unwrap_or(u32::MAX),
                quota_units: quota_units.max(0) as u64,
                duration: Duration::from_millis(duration_ms.max(0) as u64),
                error: row.get("error"),
            });
        }
        Ok(out)
    }

    /// Ids already written to `destination`.
    pub async fn written_ids(&self, destination: &Destination) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT video_id FROM written_videos WHERE spreadsheet_id = ?1 AND tab = ?2",
        )
        .bind(&destination.spreadsheet_id)
        .bind(&destination.tab)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.get::<String, _>("video_id"))
            .collect())
    }

    /// Record ids as written to `destination`. Already-known ids are ignored.
    pub async fn insert_written_ids(
        &self,
        destination: &Destination,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now_ts = to_unix(now);
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO written_videos (spreadsheet_id, tab, video_id, written_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&destination.spreadsheet_id)
            .bind(&destination.tab)
            .bind(id)
            .bind(now_ts)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
