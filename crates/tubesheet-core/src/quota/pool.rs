//! Lock-guarded composition of the quota tracker and key rotator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::SyncError;

use super::redact;
use super::rotator::{KeyRotator, KeyStatus};
use super::tracker::{Endpoint, QuotaLevel, QuotaReport, QuotaThresholds, QuotaTracker};

#[derive(Debug)]
struct PoolState {
    tracker: QuotaTracker,
    rotator: KeyRotator,
    current: Option<String>,
}

/// Per-key line for status output.
#[derive(Debug, Clone)]
pub struct KeyReport {
    pub label: String,
    pub status: KeyStatus,
    pub report: QuotaReport,
}

/// Shared key/quota state. Cloning shares the same underlying state; every
/// mutation goes through one mutex so two workers never disagree about which
/// keys are still usable.
#[derive(Debug, Clone)]
pub struct KeyPool {
    inner: Arc<Mutex<PoolState>>,
}

impl KeyPool {
    pub fn new<I, S>(keys: I, daily_budget: u64, thresholds: QuotaThresholds) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(Mutex::new(PoolState {
                tracker: QuotaTracker::new(daily_budget, thresholds),
                rotator: KeyRotator::new(keys),
                current: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Key to use for the next request. Keeps the current key until it turns
    /// critical, then rotates; keys found critical on the way are marked
    /// failed. Never issues a request itself.
    pub fn acquire(&self, now: DateTime<Utc>) -> Result<String, SyncError> {
        let mut st = self.state();
        if st.tracker.roll_over_if_new_day(now) {
            st.rotator.reset();
            st.current = None;
            tracing::info!("quota window rolled over; all API keys reactivated");
        }

        if let Some(cur) = st.current.clone() {
            if st.rotator.is_active(&cur) {
                if st.tracker.level(&cur) != QuotaLevel::Critical {
                    return Ok(cur);
                }
                tracing::warn!(key = %redact(&cur), "API key at critical quota; rotating");
                st.rotator.mark_failed(&cur);
            }
            st.current = None;
        }

        while let Some(key) = st.rotator.next() {
            if st.tracker.level(&key) == QuotaLevel::Critical {
                tracing::warn!(key = %redact(&key), "API key at critical quota; skipping");
                st.rotator.mark_failed(&key);
                continue;
            }
            tracing::debug!(key = %redact(&key), "using API key");
            st.current = Some(key.clone());
            return Ok(key);
        }
        Err(SyncError::QuotaExhausted)
    }

    /// Record `units` spent with `key` and return the key's resulting level.
    pub fn charge(&self, key: &str, endpoint: Endpoint, units: u32) -> QuotaLevel {
        let mut st = self.state();
        st.tracker.track(key, endpoint, units);
        st.rotator.record_usage(key, units);
        st.tracker.level(key)
    }

    /// Mark `key` failed (quota exceeded or rejected upstream).
    pub fn fail_key(&self, key: &str) {
        let mut st = self.state();
        if st.rotator.mark_failed(key) {
            tracing::warn!(key = %redact(key), "API key marked failed");
        }
        if st.current.as_deref() == Some(key) {
            st.current = None;
        }
    }

    pub fn active_count(&self) -> usize {
        self.state().rotator.active_count()
    }

    pub fn report(&self) -> Vec<KeyReport> {
        let st = self.state();
        st.rotator
            .slots()
            .iter()
            .map(|slot| KeyReport {
                label: redact(&slot.key),
                status: slot.status,
                report: st.tracker.report(&slot.key),
            })
            .collect()
    }

    /// Units spent per endpoint across all keys in the current window.
    pub fn endpoint_breakdown(&self) -> Vec<(Endpoint, u64)> {
        self.state().tracker.endpoint_breakdown()
    }
}
