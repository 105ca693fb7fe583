//! Types used by the job store.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::FilterConfig;
use crate::model::{ChannelRef, Destination};

/// Job identifier.
pub type JobId = i64;

/// Job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            _ => JobStatus::Failed,
        }
    }
}

/// How often a job comes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    /// Only runs when triggered by hand.
    Manual,
    Daily,
    Weekly,
    /// Same day next calendar month, clamped to the month's last day.
    Monthly,
}

impl Recurrence {
    pub fn as_str(self) -> &'static str {
        match self {
            Recurrence::Manual => "manual",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" | "never" => Ok(Recurrence::Manual),
            "daily" | "day" => Ok(Recurrence::Daily),
            "weekly" | "week" => Ok(Recurrence::Weekly),
            "monthly" | "month" => Ok(Recurrence::Monthly),
            other => Err(format!(
                "unknown recurrence '{other}' (expected manual, daily, weekly or monthly)"
            )),
        }
    }
}

/// Per-job settings, stored as JSON in the DB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub filter: FilterConfig,
    /// Overrides the configured `max_videos` for this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_videos: Option<usize>,
}

/// Full job record used by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub channel: ChannelRef,
    pub destination: Destination,
    pub recurrence: Recurrence,
    pub settings: JobSettings,
    pub status: JobStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    /// Reason recorded by the last failed run; cleared on success.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub channel: ChannelRef,
    pub destination: Destination,
    pub recurrence: Recurrence,
    pub settings: JobSettings,
}

/// Outcome of one run, appended to the run history.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    pub videos_fetched: usize,
    pub videos_written: usize,
    pub api_calls: u32,
    pub quota_units: u64,
    pub duration: Duration,
    /// Human-readable failure reason; `None` on success.
    pub error: Option<String>,
}

impl SyncResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
