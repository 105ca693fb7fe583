//! `tubesheet add <channel> --spreadsheet <id>` – add a sync job.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tubesheet_core::filter::{FilterConfig, KeywordMode};
use tubesheet_core::model::{ChannelRef, Destination};
use tubesheet_core::store::{JobDb, JobSettings, NewJob, Recurrence};

#[derive(Debug, Clone)]
pub struct AddArgs {
    pub channel: String,
    pub spreadsheet: String,
    pub tab: String,
    pub every: Recurrence,
    pub min_duration: Option<u64>,
    pub max_duration: Option<u64>,
    pub keyword: Option<String>,
    pub keyword_mode: KeywordMode,
    pub published_after: Option<NaiveDate>,
    pub max_videos: Option<usize>,
}

impl AddArgs {
    pub fn into_new_job(self) -> Result<NewJob> {
        let channel = ChannelRef::parse(&self.channel)?;
        let destination = Destination::new(&self.spreadsheet, &self.tab)?;
        if let (Some(min), Some(max)) = (self.min_duration, self.max_duration) {
            anyhow::ensure!(
                min <= max,
                "--min-duration {min} exceeds --max-duration {max}"
            );
        }
        let published_after = self
            .published_after
            .map(|d| {
                d.and_hms_opt(0, 0, 0)
                    .map(|t| t.and_utc())
                    .context("invalid --published-after date")
            })
            .transpose()?;
        Ok(NewJob {
            channel,
            destination,
            recurrence: self.every,
            settings: JobSettings {
                filter: FilterConfig {
                    min_duration_seconds: self.min_duration,
                    max_duration_seconds: self.max_duration,
                    keyword: self.keyword.unwrap_or_default().trim().to_string(),
                    keyword_mode: self.keyword_mode,
                    published_after,
                },
                max_videos: self.max_videos,
            },
        })
    }
}

pub async fn run_add(db: &JobDb, args: AddArgs) -> Result<()> {
    let job = args.into_new_job()?;
    let id = db.add_job(&job, Utc::now()).await?;
    println!(
        "Added job {id}: {} -> {} ({})",
        job.channel,
        job.destination,
        job.recurrence.as_str()
    );
    Ok(())
}
