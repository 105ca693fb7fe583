//! CLI for the tubesheet sync engine.

mod commands;
mod control_socket;
mod engine;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tubesheet_core::config;
use tubesheet_core::filter::KeywordMode;
use tubesheet_core::store::{JobDb, Recurrence};

use commands::{
    run_add, run_cancel, run_due, run_history, run_remove, run_scheduler, run_status, run_sync,
    AddArgs,
};

/// Top-level CLI for tubesheet.
#[derive(Debug, Parser)]
#[command(name = "tubesheet")]
#[command(about = "tubesheet: sync YouTube channel uploads into spreadsheets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a sync job for a channel.
    Add {
        /// Channel id (UC...), @handle, or youtube.com channel URL.
        channel: String,
        /// Spreadsheet id or its docs.google.com URL.
        #[arg(long)]
        spreadsheet: String,
        /// Tab receiving the rows.
        #[arg(long, default_value = "Videos")]
        tab: String,
        /// How often the job comes due: manual, daily, weekly or monthly.
        #[arg(long, default_value = "daily", value_name = "RECURRENCE")]
        every: Recurrence,
        /// Skip videos shorter than this many seconds.
        #[arg(long, value_name = "SECS")]
        min_duration: Option<u64>,
        /// Skip videos longer than this many seconds.
        #[arg(long, value_name = "SECS")]
        max_duration: Option<u64>,
        /// Keep only videos mentioning this keyword (case-insensitive).
        #[arg(long)]
        keyword: Option<String>,
        /// Where the keyword must appear: any_match, title_only or description_only.
        #[arg(long, default_value = "any_match", value_name = "MODE")]
        keyword_mode: KeywordMode,
        /// Keep only videos published on or after this date (YYYY-MM-DD, UTC).
        #[arg(long, value_name = "DATE")]
        published_after: Option<NaiveDate>,
        /// Cap on videos fetched per run (default from config).
        #[arg(long, value_name = "N")]
        max_videos: Option<usize>,
    },

    /// Remove a job by its ID (its run history is kept).
    Remove {
        /// Job identifier.
        id: i64,
    },

    /// Show all jobs with their next due time, plus API key and quota settings.
    Status,

    /// List the jobs that are due now without running them.
    Due,

    /// Run every due job.
    Run {
        /// Run up to N jobs concurrently (default from config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// Run one job now, whether due or not.
    Sync {
        /// Job identifier.
        id: i64,
    },

    /// Show the most recent runs of a job.
    History {
        /// Job identifier.
        id: i64,
        /// Number of runs to show.
        #[arg(long, default_value = "10", value_name = "N")]
        limit: usize,
    },

    /// Cancel a job running in another `tubesheet run` or `tubesheet sync`.
    Cancel {
        /// Job identifier.
        id: i64,
    },
}

impl CliCommand {
    /// Dispatch the parsed command. `Ok(false)` means at least one executed
    /// job failed; the process then exits with status 1.
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", redacted(&cfg));

        if let CliCommand::Cancel { id } = cli.command {
            return run_cancel(id).await;
        }
        let db = JobDb::open_default().await?;

        match cli.command {
            CliCommand::Add {
                channel,
                spreadsheet,
                tab,
                every,
                min_duration,
                max_duration,
                keyword,
                keyword_mode,
                published_after,
                max_videos,
            } => {
                let args = AddArgs {
                    channel,
                    spreadsheet,
                    tab,
                    every,
                    min_duration,
                    max_duration,
                    keyword,
                    keyword_mode,
                    published_after,
                    max_videos,
                };
                run_add(&db, args).await?;
                Ok(true)
            }
            CliCommand::Remove { id } => {
                run_remove(&db, id).await?;
                Ok(true)
            }
            CliCommand::Status => {
                run_status(&db, &cfg).await?;
                Ok(true)
            }
            CliCommand::Due => {
                run_due(&db, &cfg).await?;
                Ok(true)
            }
            CliCommand::Run { workers } => {
                run_scheduler(&db, &cfg, workers.unwrap_or(cfg.max_workers)).await
            }
            CliCommand::Sync { id } => run_sync(&db, &cfg, id).await,
            CliCommand::History { id, limit } => {
                run_history(&db, id, limit).await?;
                Ok(true)
            }
            CliCommand::Cancel { .. } => Ok(true),
        }
    }
}

/// Config for debug logging with API keys masked.
fn redacted(cfg: &config::SyncConfig) -> config::SyncConfig {
    let mut cfg = cfg.clone();
    cfg.api_keys = cfg
        .api_keys
        .iter()
        .map(|k| tubesheet_core::quota::redact(k))
        .collect();
    cfg
}

#[cfg(test)]
mod tests;
