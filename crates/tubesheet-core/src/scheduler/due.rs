//! Which jobs are due, and recovery of jobs stranded in `running`.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::store::{Job, JobStatus, JobStore, Recurrence};

/// When `job` next comes due: the stored due time, else one interval after
/// the last run, else (never run) its creation time. Manual jobs without a
/// stored due time are never due.
pub fn effective_next_due(job: &Job) -> Option<DateTime<Utc>> {
    if let Some(due) = job.next_due_at {
        return Some(due);
    }
    if job.recurrence == Recurrence::Manual {
        return None;
    }
    match job.last_run_at {
        Some(last) => job.recurrence.next_after(last),
        None => Some(job.created_at),
    }
}

/// A running job is never due, whatever its due time says.
pub fn is_due(job: &Job, now: DateTime<Utc>) -> bool {
    job.status != JobStatus::Running && effective_next_due(job).is_some_and(|due| due <= now)
}

/// Due jobs, earliest due first (ties by id).
pub async fn due_jobs(store: &dyn JobStore, now: DateTime<Utc>) -> Result<Vec<Job>> {
    let mut due: Vec<Job> = store
        .load_jobs()
        .await?
        .into_iter()
        .filter(|j| is_due(j, now))
        .collect();
    due.sort_by_key(|j| (effective_next_due(j), j.id));
    Ok(due)
}

/// Reset jobs stuck in `running` for longer than `stale_after` (the process
/// running them died) back to `pending`. Returns how many were reset.
pub async fn recover_orphans(
    store: &dyn JobStore,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Result<usize> {
    let mut recovered = 0;
    for mut job in store.load_jobs().await? {
        if job.status != JobStatus::Running {
            continue;
        }
        let stale = job
            .last_run_at
            .map_or(true, |started| now.signed_duration_since(started) > stale_after);
        if !stale {
            continue;
        }
        tracing::warn!(
            job_id = job.id,
            started = ?job.last_run_at,
            "job stuck in running past the staleness threshold; resetting to pending"
        );
        job.status = JobStatus::Pending;
        job.last_error = Some("orphaned: previous run did not finish".into());
        job.updated_at = now;
        store.save_job(&job).await?;
        recovered += 1;
    }
    Ok(recovered)
}
