//! `tubesheet run` – run every due job.

use anyhow::Result;
use chrono::Utc;
use tubesheet_core::config::SyncConfig;
use tubesheet_core::store::{JobDb, SyncResult};

use crate::cli::engine::Engine;

pub async fn run_scheduler(db: &JobDb, cfg: &SyncConfig, workers: usize) -> Result<bool> {
    let engine = Engine::start(db, cfg)?;
    let outcome = engine.scheduler.run_due(Utc::now(), workers).await;
    engine.finish().await;
    let results = outcome?;

    if results.is_empty() {
        println!("No jobs due.");
        return Ok(true);
    }
    for r in &results {
        print_result(r);
    }
    let failed = results.iter().filter(|r| !r.succeeded()).count();
    tracing::info!(jobs = results.len(), failed, "run completed");
    Ok(failed == 0)
}

pub(super) fn print_result(r: &SyncResult) {
    match &r.error {
        None => println!(
            "job {}: ok, {} new row(s) from {} video(s), {} API call(s), {} quota unit(s), {:.1}s",
            r.job_id,
            r.videos_written,
            r.videos_fetched,
            r.api_calls,
            r.quota_units,
            r.duration.as_secs_f64()
        ),
        Some(reason) => println!(
            "job {}: FAILED after {} row(s): {}",
            r.job_id, r.videos_written, reason
        ),
    }
}
