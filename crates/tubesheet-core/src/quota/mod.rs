//! Quota accounting and API key rotation.
//!
//! `QuotaTracker` counts units per key against a daily budget and
//! `KeyRotator` hands out keys round-robin. Both live behind the single lock
//! in `KeyPool`, which is what orchestrators receive, so rotation decisions
//! stay consistent across concurrent syncs.

mod pool;
mod rotator;
mod tracker;

pub use pool::{KeyPool, KeyReport};
pub use rotator::{ApiKeySlot, KeyRotator, KeyStatus};
pub use tracker::{Endpoint, QuotaLevel, QuotaReport, QuotaThresholds, QuotaTracker};

/// Short form of a key for logs and status output (never print full keys).
pub fn redact(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}
