//! Job scheduler.
//!
//! Decides which sync jobs are due, claims them in the store, drives each
//! through the channel sync and the batch writer, and records the outcome
//! (status, reason, next due time, run history). Every sync failure ends in
//! a recorded `failed` status; only store failures are returned as errors.

mod due;
mod parallel;
mod recurrence;
mod run;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::SyncConfig;
use crate::control::SyncControl;
use crate::progress::ProgressSender;
use crate::store::{Job, JobId, JobStore, SyncResult};
use crate::sync::ChannelSync;
use crate::writer::{BatchWriter, RowSink};

pub use due::{due_jobs, effective_next_due, is_due, recover_orphans};

/// One line of `status` output.
#[derive(Debug, Clone)]
pub struct JobOverview {
    pub job: Job,
    pub next_due: Option<DateTime<Utc>>,
    pub due: bool,
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    sync: Arc<ChannelSync>,
    sink: Arc<dyn RowSink>,
    writer: BatchWriter,
    control: Arc<SyncControl>,
    progress: ProgressSender,
    max_videos: usize,
    stale_after: chrono::Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        sync: Arc<ChannelSync>,
        sink: Arc<dyn RowSink>,
        cfg: &SyncConfig,
    ) -> Self {
        Self {
            store,
            sync,
            sink,
            writer: BatchWriter::new(cfg.batch_size),
            control: Arc::new(SyncControl::new()),
            progress: ProgressSender::disabled(),
            max_videos: cfg.max_videos,
            stale_after: cfg.stale_run_after(),
        }
    }

    /// Share a control registry with the control socket.
    pub fn with_control(mut self, control: Arc<SyncControl>) -> Self {
        self.control = control;
        self
    }

    /// Progress for batch writes; page progress comes from the `ChannelSync`.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn control(&self) -> &Arc<SyncControl> {
        &self.control
    }

    pub fn channel_sync(&self) -> &Arc<ChannelSync> {
        &self.sync
    }

    /// Jobs due at `now` (dry run: nothing is claimed).
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        due_jobs(&*self.store, now).await
    }

    pub async fn recover_orphans(&self, now: DateTime<Utc>) -> Result<usize> {
        recover_orphans(&*self.store, now, self.stale_after).await
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<Vec<JobOverview>> {
        Ok(self
            .store
            .load_jobs()
            .await?
            .into_iter()
            .map(|job| JobOverview {
                next_due: effective_next_due(&job),
                due: is_due(&job, now),
                job,
            })
            .collect())
    }

    pub async fn history(&self, job_id: JobId, limit: usize) -> Result<Vec<SyncResult>> {
        self.store.history(job_id, limit).await
    }
}
