//! Video source contract.
//!
//! The engine only knows this trait; `youtube::YouTubeClient` is the
//! production implementation and tests plug in scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ChannelRef, VideoRecord};

/// Result of a conditional fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// The upstream confirmed the presented validator is still current.
    Unchanged,
    /// Fresh content, with the validator to present next time (if any).
    Modified {
        payload: T,
        validator: Option<String>,
    },
}

impl<T> Fetched<T> {
    pub fn modified(payload: T, validator: Option<String>) -> Self {
        Fetched::Modified { payload, validator }
    }
}

/// One page of a channel's upload listing, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPage {
    pub videos: Vec<VideoRecord>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Errors reported by a video source. Classified by `retry::classify`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// The key used for the request is out of quota or was rejected.
    #[error("API key rejected: {0}")]
    QuotaExceeded(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Resolve a handle/username/URL reference to a canonical channel id.
    async fn resolve_channel(
        &self,
        channel: &ChannelRef,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<String>, SourceError>;

    /// Fetch one page of the channel's uploads.
    async fn list_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<VideoPage>, SourceError>;
}
