use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::quota::QuotaThresholds;
use crate::retry::RetryPolicy;

/// Environment variable holding extra API keys (comma separated).
pub const API_KEYS_ENV: &str = "TUBESHEET_API_KEYS";

/// Upper bound for any backoff delay read from the config.
const MAX_BACKOFF_SECS: u64 = 60 * 60;

/// Upper bound for the orphan threshold read from the config.
const MAX_STALE_RUN_SECS: u64 = 365 * 24 * 60 * 60;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per page fetch (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Random jitter as a fraction of the computed delay (0.0 = none).
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            // NaN collapses to 0 through `max`; infinity is capped.
            base_delay: Duration::from_secs_f64(
                self.base_delay_secs.max(0.0).min(MAX_BACKOFF_SECS as f64),
            ),
            max_delay: Duration::from_secs(self.max_delay_secs.min(MAX_BACKOFF_SECS)),
            jitter: if self.jitter.is_finite() {
                self.jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }
}

/// Global configuration loaded from `~/.config/tubesheet/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// YouTube Data API keys, used round-robin.
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Daily quota budget per key, in API units.
    pub daily_quota_units: u64,
    /// Usage percentage at which a key is reported as `warning`.
    pub warning_threshold_pct: f64,
    /// Usage percentage at which a key is `critical` and gets rotated out.
    pub critical_threshold_pct: f64,
    /// Maximum number of videos fetched per channel sync.
    pub max_videos: usize,
    /// Page size requested from the video source.
    pub page_size: u32,
    /// Rows per destination append request.
    pub batch_size: usize,
    /// Maximum number of jobs synced concurrently.
    pub max_workers: usize,
    /// A job stuck in `running` longer than this is treated as orphaned.
    pub stale_run_secs: u64,
    /// Units charged when the upstream confirms a cached payload is unchanged.
    #[serde(default)]
    pub validation_cost_units: u32,
    /// Total timeout per HTTP request.
    pub request_timeout_secs: u64,
    /// Connect timeout per HTTP request.
    pub connect_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            daily_quota_units: 10_000,
            warning_threshold_pct: 75.0,
            critical_threshold_pct: 95.0,
            max_videos: 500,
            page_size: 50,
            batch_size: 500,
            max_workers: 4,
            stale_run_secs: 2 * 60 * 60,
            validation_cost_units: 0,
            request_timeout_secs: 30,
            connect_timeout_secs: 15,
            retry: None,
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }

    pub fn thresholds(&self) -> QuotaThresholds {
        QuotaThresholds {
            warning_pct: self.warning_threshold_pct,
            critical_pct: self.critical_threshold_pct,
        }
    }

    /// Configured keys plus any from `TUBESHEET_API_KEYS`, deduplicated, order kept.
    pub fn effective_api_keys(&self) -> Vec<String> {
        let from_env = std::env::var(API_KEYS_ENV).unwrap_or_default();
        merge_keys(&self.api_keys, &from_env)
    }

    pub fn stale_run_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_run_secs.min(MAX_STALE_RUN_SECS) as i64)
    }
}

fn merge_keys(configured: &[String], extra: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let candidates = configured
        .iter()
        .map(|s| s.as_str())
        .chain(extra.split(','));
    for key in candidates {
        let key = key.trim();
        if !key.is_empty() && !out.iter().any(|k| k == key) {
            out.push(key.to_string());
        }
    }
    out
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tubesheet")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// State directory for the job DB, cache snapshot, log and control socket:
/// `~/.local/state/tubesheet` on Debian.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tubesheet")?;
    Ok(xdg_dirs.get_state_home().join("tubesheet"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}
