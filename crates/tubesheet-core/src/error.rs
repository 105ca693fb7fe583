//! Engine error taxonomy.
//!
//! Every sync failure ends up as one of these variants; its `Display` text is
//! the human-readable reason recorded in run history.

use crate::retry::{self, ErrorKind};
use crate::source::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Upstream kept failing with retryable errors after every attempt and key.
    #[error("transient upstream error: {0}")]
    Transient(String),
    /// Every configured API key is failed or at critical quota.
    #[error("quota exhausted: no API key with remaining quota")]
    QuotaExhausted,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The destination rejected a batch; `written` rows were committed before it.
    #[error("partial write: {written} row(s) written before failure: {reason}")]
    PartialWrite { written: usize, reason: String },
    #[error("cancelled")]
    Cancelled,
    /// Non-retryable upstream failure that is not one of the above.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

impl From<SourceError> for SyncError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::NotFound(what) => SyncError::NotFound(what),
            SourceError::InvalidInput(what) => SyncError::InvalidInput(what),
            other => match retry::classify(&other) {
                ErrorKind::QuotaExceeded => SyncError::QuotaExhausted,
                kind if kind.is_transient() => SyncError::Transient(other.to_string()),
                _ => SyncError::Upstream(other.to_string()),
            },
        }
    }
}
