//! Persistent job store (SQLite via sqlx).
//!
//! Stores sync jobs, their run history, and the ids of videos already
//! written to each destination. The scheduler only sees the `JobStore`
//! trait; `JobDb` is the SQLite implementation.

mod db;
mod jobs;
mod runs;
pub mod types;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use db::JobDb;
#[cfg(test)]
pub(crate) use db::open_memory;
pub use types::*;

use crate::model::Destination;

/// Job persistence used by the scheduler.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_jobs(&self) -> Result<Vec<Job>>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// Persist every mutable field of `job`.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Atomically mark the job `running` unless it already is.
    async fn try_claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool>;

    /// Append a run to the job's history.
    async fn record_run(&self, result: &SyncResult) -> Result<()>;

    /// Most recent runs, newest first.
    async fn history(&self, id: JobId, limit: usize) -> Result<Vec<SyncResult>>;

    async fn known_ids(&self, destination: &Destination) -> Result<HashSet<String>>;

    async fn add_known_ids(
        &self,
        destination: &Destination,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
impl JobStore for JobDb {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        self.list_jobs().await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        self.find_job(id).await
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.upsert_job(job).await
    }

    async fn try_claim(&self, id: JobId, now: DateTime<Utc>) -> Result<bool> {
        self.claim_job(id, now).await
    }

    async fn record_run(&self, result: &SyncResult) -> Result<()> {
        self.insert_run(result).await
    }

    async fn history(&self, id: JobId, limit: usize) -> Result<Vec<SyncResult>> {
        self.list_runs(id, limit).await
    }

    async fn known_ids(&self, destination: &Destination) -> Result<HashSet<String>> {
        self.written_ids(destination).await
    }

    async fn add_known_ids(
        &self,
        destination: &Destination,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.insert_written_ids(destination, ids, now).await
    }
}
