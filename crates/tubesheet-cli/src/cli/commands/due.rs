//! `tubesheet due` – dry run: list jobs due now.

use anyhow::Result;
use chrono::Utc;
use tubesheet_core::config::SyncConfig;
use tubesheet_core::scheduler::{due_jobs, effective_next_due};
use tubesheet_core::store::JobDb;

use super::status::fmt_time;

pub async fn run_due(db: &JobDb, cfg: &SyncConfig) -> Result<()> {
    let due = due_jobs(db, Utc::now()).await?;
    if due.is_empty() {
        println!("No jobs due.");
        return Ok(());
    }
    println!(
        "{:<5} {:<17} {:<30} {}",
        "ID", "DUE SINCE", "CHANNEL", "DESTINATION"
    );
    for j in &due {
        println!(
            "{:<5} {:<17} {:<30} {}",
            j.id,
            fmt_time(effective_next_due(j)),
            j.channel.to_string(),
            j.destination
        );
    }
    println!(
        "{} job(s) due; `tubesheet run` would sync up to {} at a time.",
        due.len(),
        cfg.max_workers.max(1)
    );
    Ok(())
}
