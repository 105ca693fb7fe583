//! `tubesheet status` – jobs with their next due time, then key/quota settings.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tubesheet_core::config::SyncConfig;
use tubesheet_core::quota::redact;
use tubesheet_core::scheduler::{effective_next_due, is_due};
use tubesheet_core::store::JobDb;

pub(super) fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn run_status(db: &JobDb, cfg: &SyncConfig) -> Result<()> {
    let now = Utc::now();
    let jobs = db.list_jobs().await?;
    if jobs.is_empty() {
        println!("No jobs in database.");
    } else {
        println!(
            "{:<5} {:<8} {:<8} {:<17} {:<17} {:<30} {}",
            "ID", "STATUS", "EVERY", "LAST RUN", "NEXT DUE", "CHANNEL", "DESTINATION"
        );
        for j in &jobs {
            let next = effective_next_due(j);
            let due_mark = if is_due(j, now) { "*" } else { "" };
            println!(
                "{:<5} {:<8} {:<8} {:<17} {:<17} {:<30} {}",
                j.id,
                j.status.as_str(),
                j.recurrence.as_str(),
                fmt_time(j.last_run_at),
                format!("{}{}", fmt_time(next), due_mark),
                j.channel.to_string(),
                j.destination
            );
            if let Some(err) = &j.last_error {
                println!("      last error: {err}");
            }
        }
    }

    let keys = cfg.effective_api_keys();
    println!();
    println!(
        "API keys: {} (daily budget {} units each; warning {}%, critical {}%)",
        keys.len(),
        cfg.daily_quota_units,
        cfg.warning_threshold_pct,
        cfg.critical_threshold_pct
    );
    for key in keys {
        println!("  {}", redact(&key));
    }
    Ok(())
}
