//! `tubesheet history <id>` – recent runs of a job.

use anyhow::{bail, Result};
use tubesheet_core::store::JobDb;

use super::status::fmt_time;

pub async fn run_history(db: &JobDb, id: i64, limit: usize) -> Result<()> {
    if db.find_job(id).await?.is_none() {
        bail!("job {id} not found");
    }
    let runs = db.list_runs(id, limit).await?;
    if runs.is_empty() {
        println!("Job {id} has not run yet.");
        return Ok(());
    }
    println!(
        "{:<17} {:<7} {:>7} {:>7} {:>6} {:>6} {:>8}  {}",
        "STARTED", "RESULT", "FETCHED", "WRITTEN", "CALLS", "UNITS", "SECS", "ERROR"
    );
    for r in runs {
        println!(
            "{:<17} {:<7} {:>7} {:>7} {:>6} {:>6} {:>8.1}  {}",
            fmt_time(Some(r.started_at)),
            if r.succeeded() { "ok" } else { "failed" },
            r.videos_fetched,
            r.videos_written,
            r.api_calls,
            r.quota_units,
            r.duration.as_secs_f64(),
            r.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
