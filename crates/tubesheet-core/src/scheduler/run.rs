//! Run one job: claim, sync, write, record.

use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};

use crate::control::CancelToken;
use crate::store::{Job, JobId, JobStatus, SyncResult};
use crate::sync::SyncRequest;

use super::Scheduler;

impl Scheduler {
    /// Run `job_id` now, whether due or not.
    ///
    /// Returns an error only when the job does not exist, is already running,
    /// or the store fails; every sync or write failure is recorded on the job
    /// and in the returned `SyncResult`.
    pub async fn run(&self, job_id: JobId, now: DateTime<Utc>) -> Result<SyncResult> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| anyhow!("job {} not found", job_id))?;
        if !self.store.try_claim(job_id, now).await? {
            bail!("job {} is already running", job_id);
        }
        tracing::info!(
            job_id,
            channel = %job.channel,
            destination = %job.destination,
            "sync started"
        );

        let cancel = self.control.register(job_id);
        let started = Instant::now();
        let mut result = SyncResult {
            job_id,
            started_at: now,
            videos_fetched: 0,
            videos_written: 0,
            api_calls: 0,
            quota_units: 0,
            duration: Default::default(),
            error: None,
        };
        if let Err(e) = self.execute(&job, now, &cancel, &mut result).await {
            result.error = Some(format!("{:#}", e));
        }
        result.duration = started.elapsed();
        self.control.unregister(job_id);

        self.finish(job, now, &result).await?;
        Ok(result)
    }

    async fn execute(
        &self,
        job: &Job,
        now: DateTime<Utc>,
        cancel: &CancelToken,
        result: &mut SyncResult,
    ) -> Result<()> {
        let known_ids = self.store.known_ids(&job.destination).await?;
        let include_header = known_ids.is_empty();

        let request = SyncRequest {
            channel: job.channel.clone(),
            known_ids,
            filter: job.settings.filter.clone(),
            published_after: None,
            max_videos: job.settings.max_videos.unwrap_or(self.max_videos),
            job_id: Some(job.id),
            cancel: Some(cancel.clone()),
        };
        let outcome = match self.sync.sync(request).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                result.api_calls = failure.stats.api_calls;
                result.quota_units = failure.stats.quota_units;
                result.videos_fetched = failure.stats.videos_fetched;
                return Err(failure.error.into());
            }
        };
        result.api_calls = outcome.stats.api_calls;
        result.quota_units = outcome.stats.quota_units;
        result.videos_fetched = outcome.stats.videos_fetched;

        if outcome.videos.is_empty() {
            tracing::info!(job_id = job.id, "no new videos");
            return Ok(());
        }

        let write = self
            .writer
            .write(
                &*self.sink,
                &job.destination,
                &outcome.videos,
                include_header,
                Some(cancel),
            )
            .await;
        result.videos_written = write.written;

        // Only rows that reached the destination count as known; the rest are
        // picked up again by the next run.
        let written: Vec<String> = outcome.videos[..write.written]
            .iter()
            .map(|v| v.id.clone())
            .collect();
        self.store
            .add_known_ids(&job.destination, &written, now)
            .await?;
        self.progress.emit(
            Some(job.id),
            write.written as u64,
            Some(outcome.videos.len() as u64),
            format!("wrote {} row(s) to {}", write.written, job.destination),
        );

        match write.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn finish(&self, mut job: Job, now: DateTime<Utc>, result: &SyncResult) -> Result<()> {
        job.status = if result.succeeded() {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        job.last_run_at = Some(now);
        job.next_due_at = job.recurrence.next_after(now);
        job.last_error = result.error.clone();
        job.updated_at = now;
        self.store.save_job(&job).await?;
        self.store.record_run(result).await?;

        match &result.error {
            None => tracing::info!(
                job_id = job.id,
                fetched = result.videos_fetched,
                written = result.videos_written,
                api_calls = result.api_calls,
                quota_units = result.quota_units,
                "sync succeeded"
            ),
            Some(reason) => tracing::warn!(
                job_id = job.id,
                written = result.videos_written,
                "sync failed: {}",
                reason
            ),
        }
        Ok(())
    }
}
