use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Logical upstream operations and their default unit cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// `channels.list` lookup by handle/username.
    ChannelResolve,
    /// One upload page: `playlistItems.list` plus `videos.list` for details.
    VideoListPage,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::ChannelResolve => "channel_resolve",
            Endpoint::VideoListPage => "video_list_page",
        }
    }

    pub fn cost(self) -> u32 {
        match self {
            Endpoint::ChannelResolve => 1,
            Endpoint::VideoListPage => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    Normal,
    Warning,
    Critical,
}

impl QuotaLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaLevel::Normal => "normal",
            QuotaLevel::Warning => "warning",
            QuotaLevel::Critical => "critical",
        }
    }
}

/// Usage percentages at which a key turns `warning` and `critical`.
#[derive(Debug, Clone, Copy)]
pub struct QuotaThresholds {
    pub warning_pct: f64,
    pub critical_pct: f64,
}

impl Default for QuotaThresholds {
    fn default() -> Self {
        Self {
            warning_pct: 75.0,
            critical_pct: 95.0,
        }
    }
}

impl QuotaThresholds {
    pub fn level(&self, percentage: f64) -> QuotaLevel {
        if percentage >= self.critical_pct {
            QuotaLevel::Critical
        } else if percentage >= self.warning_pct {
            QuotaLevel::Warning
        } else {
            QuotaLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaReport {
    pub used: u64,
    pub budget: u64,
    pub percentage: f64,
    pub level: QuotaLevel,
}

/// Per-key usage against a daily budget, plus a per-endpoint breakdown.
///
/// Never fails: running past the budget shows up as `QuotaLevel::Critical`
/// and the caller decides whether to rotate.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    daily_budget: u64,
    thresholds: QuotaThresholds,
    used: HashMap<String, u64>,
    by_endpoint: BTreeMap<Endpoint, u64>,
    warned: HashSet<String>,
    window: Option<NaiveDate>,
}

impl QuotaTracker {
    pub fn new(daily_budget: u64, thresholds: QuotaThresholds) -> Self {
        Self {
            daily_budget,
            thresholds,
            used: HashMap::new(),
            by_endpoint: BTreeMap::new(),
            warned: HashSet::new(),
            window: None,
        }
    }

    /// Record `units` against `key` and return the key's usage percentage.
    pub fn track(&mut self, key: &str, endpoint: Endpoint, units: u32) -> f64 {
        let units = u64::from(units);
        let used = self.used.entry(key.to_string()).or_insert(0);
        *used = used.saturating_add(units);
        let total = *used;
        *self.by_endpoint.entry(endpoint).or_insert(0) += units;

        let pct = self.percentage_of(total);
        if self.thresholds.level(pct) == QuotaLevel::Warning
            && self.warned.insert(key.to_string())
        {
            tracing::warn!(
                key = %super::redact(key),
                used = total,
                budget = self.daily_budget,
                "API key quota usage at {:.1}%",
                pct
            );
        }
        pct
    }

    pub fn report(&self, key: &str) -> QuotaReport {
        let used = self.used.get(key).copied().unwrap_or(0);
        let percentage = self.percentage_of(used);
        QuotaReport {
            used,
            budget: self.daily_budget,
            percentage,
            level: self.thresholds.level(percentage),
        }
    }

    pub fn level(&self, key: &str) -> QuotaLevel {
        self.report(key).level
    }

    pub fn total_used(&self) -> u64 {
        self.used.values().sum()
    }

    pub fn endpoint_breakdown(&self) -> Vec<(Endpoint, u64)> {
        self.by_endpoint.iter().map(|(e, n)| (*e, *n)).collect()
    }

    pub fn reset(&mut self) {
        self.used.clear();
        self.by_endpoint.clear();
        self.warned.clear();
    }

    /// Start a fresh window when `now` falls on a later UTC day than the
    /// current one. Returns true when usage was reset.
    pub fn roll_over_if_new_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        match self.window {
            Some(day) if day >= today => false,
            Some(_) => {
                self.reset();
                self.window = Some(today);
                true
            }
            None => {
                self.window = Some(today);
                false
            }
        }
    }

    fn percentage_of(&self, used: u64) -> f64 {
        if self.daily_budget == 0 {
            return 100.0;
        }
        used as f64 * 100.0 / self.daily_budget as f64
    }
}
