//! Channel sync orchestrator.
//!
//! Resolves a channel reference, pages through its uploads (each page through
//! the response cache and the key pool), then dedupes against ids already
//! written to the destination and applies the job's filters:
//! resolve → paginate → dedupe → filter.

mod fetch;
#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{request_key, ResponseCache};
use crate::control::CancelToken;
use crate::dedupe::dedupe;
use crate::error::SyncError;
use crate::filter::{self, FilterConfig};
use crate::model::{ChannelRef, VideoRecord};
use crate::progress::ProgressSender;
use crate::quota::{Endpoint, KeyPool};
use crate::retry::RetryPolicy;
use crate::source::{VideoPage, VideoSource};

/// Input for one channel sync.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub channel: ChannelRef,
    /// Ids already written to the destination.
    pub known_ids: HashSet<String>,
    pub filter: FilterConfig,
    /// Overrides `filter.published_after` when set.
    pub published_after: Option<DateTime<Utc>>,
    /// Upper bound on raw videos fetched; 0 means no bound.
    pub max_videos: usize,
    /// Tags progress events.
    pub job_id: Option<i64>,
    pub cancel: Option<CancelToken>,
}

impl SyncRequest {
    pub fn new(channel: ChannelRef) -> Self {
        Self {
            channel,
            known_ids: HashSet::new(),
            filter: FilterConfig::default(),
            published_after: None,
            max_videos: 0,
            job_id: None,
            cancel: None,
        }
    }
}

/// Accounting for one sync, filled in as far as the sync got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Requests issued upstream, retries included.
    pub api_calls: u32,
    pub quota_units: u64,
    pub pages: u32,
    /// Requests answered "unchanged" and served from the cache.
    pub cache_hits: u32,
    /// Raw videos collected before dedupe and filtering.
    pub videos_fetched: usize,
    pub duplicates: usize,
    pub filtered_out: usize,
}

#[derive(Debug, Clone)]
pub struct ChannelSyncOutcome {
    pub channel_id: String,
    /// New videos that passed the filters, most recent first.
    pub videos: Vec<VideoRecord>,
    /// `known_ids` extended with every fetched id.
    pub known_ids: HashSet<String>,
    pub stats: SyncStats,
}

/// A failed sync keeps the accounting up to the failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct ChannelSyncFailure {
    pub error: SyncError,
    pub stats: SyncStats,
}

pub struct ChannelSync {
    source: Arc<dyn VideoSource>,
    keys: KeyPool,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
    validation_cost_units: u32,
    progress: ProgressSender,
}

impl ChannelSync {
    pub fn new(source: Arc<dyn VideoSource>, keys: KeyPool, cache: Arc<ResponseCache>) -> Self {
        Self {
            source,
            keys,
            cache,
            retry: RetryPolicy::default(),
            validation_cost_units: 0,
            progress: ProgressSender::disabled(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Units charged when the upstream confirms a cached payload is current.
    pub fn with_validation_cost(mut self, units: u32) -> Self {
        self.validation_cost_units = units;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    pub async fn sync(
        &self,
        request: SyncRequest,
    ) -> Result<ChannelSyncOutcome, ChannelSyncFailure> {
        let mut stats = SyncStats::default();
        match self.run(request, &mut stats).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(ChannelSyncFailure { error, stats }),
        }
    }

    async fn run(
        &self,
        request: SyncRequest,
        stats: &mut SyncStats,
    ) -> Result<ChannelSyncOutcome, SyncError> {
        let SyncRequest {
            channel,
            known_ids,
            mut filter,
            published_after,
            max_videos,
            job_id,
            cancel,
        } = request;

        check_cancel(cancel.as_ref())?;
        let channel_id = self.resolve(&channel, stats).await?;
        tracing::debug!(
            channel = %channel,
            channel_id = %channel_id,
            "channel resolved"
        );

        let limit = if max_videos == 0 {
            usize::MAX
        } else {
            max_videos
        };
        let mut fetched: Vec<VideoRecord> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            check_cancel(cancel.as_ref())?;
            let page = self
                .fetch_page(&channel_id, page_token.as_deref(), stats)
                .await?;
            stats.pages += 1;
            fetched.extend(page.videos);
            self.progress.emit(
                job_id,
                fetched.len().min(limit) as u64,
                (max_videos > 0).then_some(max_videos as u64),
                format!("fetched page {} of {}", stats.pages, channel),
            );

            if fetched.len() >= limit {
                break;
            }
            match page.next_page_token {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next);
                }
                Some(_) => {
                    tracing::warn!(
                        channel_id = %channel_id,
                        "upstream repeated a page token; stopping"
                    );
                    break;
                }
                None => break,
            }
        }
        fetched.truncate(limit);
        stats.videos_fetched = fetched.len();

        let before = fetched.len();
        let (fresh, known_ids) = dedupe(fetched, known_ids);
        stats.duplicates = before - fresh.len();

        if published_after.is_some() {
            filter.published_after = published_after;
        }
        let before = fresh.len();
        let videos = filter::apply(fresh, &filter);
        stats.filtered_out = before - videos.len();

        tracing::info!(
            channel_id = %channel_id,
            fetched = stats.videos_fetched,
            new = videos.len(),
            duplicates = stats.duplicates,
            filtered_out = stats.filtered_out,
            api_calls = stats.api_calls,
            quota_units = stats.quota_units,
            "channel sync finished"
        );

        Ok(ChannelSyncOutcome {
            channel_id,
            videos,
            known_ids,
            stats: *stats,
        })
    }

    async fn resolve(
        &self,
        channel: &ChannelRef,
        stats: &mut SyncStats,
    ) -> Result<String, SyncError> {
        if let ChannelRef::Id(id) = channel {
            return Ok(id.clone());
        }
        let reference = channel.to_string();
        let cache_key = request_key(
            Endpoint::ChannelResolve.as_str(),
            &[("channel", &reference)],
        );
        self.keyed_fetch(Endpoint::ChannelResolve, &cache_key, stats, |api_key, validator| {
            let source = Arc::clone(&self.source);
            let channel = channel.clone();
            async move {
                source
                    .resolve_channel(&channel, validator.as_deref(), &api_key)
                    .await
            }
        })
        .await
    }

    async fn fetch_page(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
        stats: &mut SyncStats,
    ) -> Result<VideoPage, SyncError> {
        let cache_key = request_key(
            Endpoint::VideoListPage.as_str(),
            &[
                ("channel_id", channel_id),
                ("page_token", page_token.unwrap_or("")),
            ],
        );
        self.keyed_fetch(Endpoint::VideoListPage, &cache_key, stats, |api_key, validator| {
            let source = Arc::clone(&self.source);
            let channel_id = channel_id.to_string();
            let page_token = page_token.map(str::to_string);
            async move {
                source
                    .list_videos(
                        &channel_id,
                        page_token.as_deref(),
                        validator.as_deref(),
                        &api_key,
                    )
                    .await
            }
        })
        .await
    }
}

fn check_cancel(cancel: Option<&CancelToken>) -> Result<(), SyncError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(SyncError::Cancelled),
        _ => Ok(()),
    }
}
