//! Run every due job with a bounded number of workers.
//!
//! Keeps up to `workers` jobs in flight; when one finishes, the next due job
//! is started. Jobs writing to the same destination never run at the same
//! time, so the second one sees the ids the first one wrote.

use std::collections::{HashSet, VecDeque};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::model::Destination;
use crate::store::{Job, SyncResult};

use super::Scheduler;

impl Scheduler {
    /// Recover orphaned jobs, then run every job due at `now`. Jobs that could
    /// not be claimed (already running elsewhere) or whose run task panicked
    /// are skipped with a warning; the remaining jobs still run to completion.
    pub async fn run_due(&self, now: DateTime<Utc>, workers: usize) -> Result<Vec<SyncResult>> {
        let workers = workers.max(1);
        let recovered = self.recover_orphans(now).await?;
        if recovered > 0 {
            tracing::info!(recovered, "reset orphaned jobs");
        }

        let mut pending: VecDeque<Job> = self.due(now).await?.into();
        tracing::info!(due = pending.len(), workers, "running due jobs");

        let mut busy: HashSet<Destination> = HashSet::new();
        let mut results = Vec::with_capacity(pending.len());
        let mut join_set = tokio::task::JoinSet::new();

        loop {
            let mut idx = 0;
            while join_set.len() < workers && idx < pending.len() {
                if busy.contains(&pending[idx].destination) {
                    idx += 1;
                    continue;
                }
                let Some(job) = pending.remove(idx) else {
                    break;
                };
                busy.insert(job.destination.clone());
                let scheduler = self.clone();
                let job_id = job.id;
                join_set.spawn(async move {
                    // A panicking run must not take the rest of the pool down.
                    let run = tokio::spawn(async move { scheduler.run(job_id, now).await });
                    let res = match run.await {
                        Ok(res) => res,
                        Err(e) => Err(anyhow!("sync task join: {}", e)),
                    };
                    (job_id, job.destination, res)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (job_id, destination, res) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!("sync worker join: {}", e);
                    continue;
                }
            };
            busy.remove(&destination);
            match res {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(job_id, "job skipped: {:#}", e),
            }
        }

        Ok(results)
    }
}
