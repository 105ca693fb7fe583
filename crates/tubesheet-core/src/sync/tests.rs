use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::*;
use crate::progress::ProgressSender;
use crate::quota::QuotaThresholds;
use crate::source::{Fetched, SourceError};

const CHANNEL: &str = "UCaaaaaaaaaaaaaaaaaaaaaa";

fn video(i: usize) -> VideoRecord {
    let newest = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let topic = if i % 2 == 0 { "rust" } else { "go" };
    VideoRecord {
        id: format!("vid{i:04}"),
        title: format!("Episode {i}"),
        description: format!("about {topic}"),
        published_at: Some(newest - chrono::Duration::days(i as i64)),
        duration_seconds: Some(60 * (i as u64 % 20)),
        view_count: 100,
        like_count: 10,
        comment_count: 1,
        channel_id: CHANNEL.into(),
        channel_title: "Test Channel".into(),
    }
}

/// Serves `videos` in pages of `page_size`, with an ETag per page.
struct FakeSource {
    videos: Vec<VideoRecord>,
    page_size: usize,
    calls: AtomicU32,
    rejected_keys: HashSet<String>,
    flaky_keys: HashSet<String>,
    handles: HashMap<String, String>,
}

impl FakeSource {
    fn new(count: usize) -> Self {
        Self {
            videos: (0..count).map(video).collect(),
            page_size: 50,
            calls: AtomicU32::new(0),
            rejected_keys: HashSet::new(),
            flaky_keys: HashSet::new(),
            handles: HashMap::from([("testchan".to_string(), CHANNEL.to_string())]),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_key(&self, api_key: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected_keys.contains(api_key) {
            return Err(SourceError::QuotaExceeded("quotaExceeded".into()));
        }
        if self.flaky_keys.contains(api_key) {
            return Err(SourceError::Timeout("operation timed out".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn resolve_channel(
        &self,
        channel: &ChannelRef,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<String>, SourceError> {
        self.check_key(api_key)?;
        let ChannelRef::Handle(handle) = channel else {
            return Err(SourceError::InvalidInput(channel.to_string()));
        };
        let id = self
            .handles
            .get(handle)
            .ok_or_else(|| SourceError::NotFound(format!("channel @{handle}")))?;
        if validator == Some("etag-resolve") {
            return Ok(Fetched::Unchanged);
        }
        Ok(Fetched::modified(id.clone(), Some("etag-resolve".into())))
    }

    async fn list_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<VideoPage>, SourceError> {
        self.check_key(api_key)?;
        assert_eq!(channel_id, CHANNEL);
        let page: usize = page_token
            .and_then(|t| t.strip_prefix('p'))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        let etag = format!("etag-page-{page}");
        if validator == Some(etag.as_str()) {
            return Ok(Fetched::Unchanged);
        }
        let start = (page * self.page_size).min(self.videos.len());
        let end = (start + self.page_size).min(self.videos.len());
        let next_page_token = (end < self.videos.len()).then(|| format!("p{}", page + 1));
        Ok(Fetched::modified(
            VideoPage {
                videos: self.videos[start..end].to_vec(),
                next_page_token,
            },
            Some(etag),
        ))
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
    }
}

fn orchestrator(source: Arc<FakeSource>, keys: &[&str], budget: u64) -> ChannelSync {
    let pool = KeyPool::new(keys.iter().copied(), budget, QuotaThresholds::default());
    ChannelSync::new(source, pool, Arc::new(ResponseCache::new())).with_retry(fast_retry())
}

fn request(max_videos: usize) -> SyncRequest {
    SyncRequest {
        max_videos,
        ..SyncRequest::new(ChannelRef::Id(CHANNEL.into()))
    }
}

#[tokio::test]
async fn stops_at_max_videos() {
    let source = Arc::new(FakeSource::new(150));
    let sync = orchestrator(Arc::clone(&source), &["k1"], 10_000);
    let out = sync.sync(request(50)).await.unwrap();
    assert_eq!(out.videos.len(), 50);
    assert_eq!(out.stats.pages, 1);
    assert_eq!(out.stats.api_calls, 1);
    assert_eq!(out.stats.quota_units, 2);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn truncates_partial_last_page() {
    let source = Arc::new(FakeSource::new(150));
    let sync = orchestrator(source, &["k1"], 10_000);
    let out = sync.sync(request(70)).await.unwrap();
    assert_eq!(out.videos.len(), 70);
    assert_eq!(out.stats.pages, 2);
    assert_eq!(out.stats.videos_fetched, 70);
}

#[tokio::test]
async fn paginates_to_the_end_when_unbounded() {
    let source = Arc::new(FakeSource::new(120));
    let sync = orchestrator(source, &["k1"], 10_000);
    let out = sync.sync(request(0)).await.unwrap();
    assert_eq!(out.videos.len(), 120);
    assert_eq!(out.stats.pages, 3);
    assert_eq!(out.videos[0].id, "vid0000");
    assert_eq!(out.videos[119].id, "vid0119");
    assert_eq!(out.channel_id, CHANNEL);
}

#[tokio::test]
async fn all_keys_critical_fails_without_calls() {
    let source = Arc::new(FakeSource::new(10));
    let sync = orchestrator(Arc::clone(&source), &["k1", "k2"], 100);
    sync.keys().charge("k1", Endpoint::VideoListPage, 100);
    sync.keys().charge("k2", Endpoint::VideoListPage, 96);

    let err = sync.sync(request(0)).await.unwrap_err();
    assert_eq!(err.error, SyncError::QuotaExhausted);
    assert!(err.to_string().contains("quota exhausted"));
    assert_eq!(err.stats.api_calls, 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn keys_turning_critical_mid_pagination_abort_the_sync() {
    let source = Arc::new(FakeSource::new(500));
    // 2 units per page, critical at 95% of 10: the fifth page makes the only key critical.
    let sync = orchestrator(Arc::clone(&source), &["k1"], 10);
    let err = sync.sync(request(0)).await.unwrap_err();
    assert_eq!(err.error, SyncError::QuotaExhausted);
    assert_eq!(err.stats.pages, 5);
    assert_eq!(source.calls(), 5);
}

#[tokio::test]
async fn rejected_key_fails_over_to_next() {
    let mut fake = FakeSource::new(10);
    fake.rejected_keys.insert("bad".into());
    let source = Arc::new(fake);
    let sync = orchestrator(Arc::clone(&source), &["bad", "good"], 10_000);
    let out = sync.sync(request(0)).await.unwrap();
    assert_eq!(out.videos.len(), 10);
    assert_eq!(out.stats.api_calls, 2);
    assert_eq!(sync.keys().active_count(), 1);
}

#[tokio::test]
async fn every_key_rejected_is_quota_exhausted() {
    let mut fake = FakeSource::new(10);
    fake.rejected_keys.extend(["a".to_string(), "b".to_string()]);
    let sync = orchestrator(Arc::new(fake), &["a", "b"], 10_000);
    let err = sync.sync(request(0)).await.unwrap_err();
    assert_eq!(err.error, SyncError::QuotaExhausted);
    assert_eq!(err.stats.api_calls, 2);
}

#[tokio::test]
async fn transient_errors_retry_then_fail_over() {
    let mut fake = FakeSource::new(10);
    fake.flaky_keys.insert("flaky".into());
    let sync = orchestrator(Arc::new(fake), &["flaky", "good"], 10_000);
    let out = sync.sync(request(0)).await.unwrap();
    assert_eq!(out.videos.len(), 10);
    // Two attempts on the flaky key, one on the good key.
    assert_eq!(out.stats.api_calls, 3);
    assert_eq!(sync.keys().active_count(), 1);
}

#[tokio::test]
async fn transient_errors_on_last_key_are_reported_as_transient() {
    let mut fake = FakeSource::new(10);
    fake.flaky_keys.insert("only".into());
    let sync = orchestrator(Arc::new(fake), &["only"], 10_000);
    let err = sync.sync(request(0)).await.unwrap_err();
    assert!(matches!(err.error, SyncError::Transient(_)));
    assert_eq!(err.stats.api_calls, 2);
    assert_eq!(sync.keys().active_count(), 1);
}

#[tokio::test]
async fn unchanged_pages_come_from_cache_at_no_extra_cost() {
    let source = Arc::new(FakeSource::new(120));
    let sync = orchestrator(source, &["k1"], 10_000);
    let first = sync.sync(request(0)).await.unwrap();
    let second = sync.sync(request(0)).await.unwrap();
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert!(second.stats.quota_units <= first.stats.quota_units);
    assert_eq!(second.stats.quota_units, 0);
    assert_eq!(
        first.videos.iter().map(|v| &v.id).collect::<Vec<_>>(),
        second.videos.iter().map(|v| &v.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn validation_cost_is_charged_for_cache_hits() {
    let source = Arc::new(FakeSource::new(10));
    let sync = orchestrator(source, &["k1"], 10_000).with_validation_cost(1);
    let first = sync.sync(request(0)).await.unwrap();
    let second = sync.sync(request(0)).await.unwrap();
    assert_eq!(first.stats.quota_units, 2);
    assert_eq!(second.stats.quota_units, 1);
}

#[tokio::test]
async fn dedupes_then_filters() {
    let source = Arc::new(FakeSource::new(20));
    let sync = orchestrator(source, &["k1"], 10_000);
    let mut req = request(0);
    req.known_ids = ["vid0000".to_string(), "vid0001".to_string()].into();
    req.filter.keyword = "RUST".into();
    let out = sync.sync(req).await.unwrap();
    assert_eq!(out.stats.videos_fetched, 20);
    assert_eq!(out.stats.duplicates, 2);
    // Even ids mention rust; vid0000 was already known.
    assert_eq!(out.videos.len(), 9);
    assert_eq!(out.stats.filtered_out, 9);
    assert!(out.videos.iter().all(|v| v.description.contains("rust")));
    assert_eq!(out.known_ids.len(), 20);
}

#[tokio::test]
async fn published_after_argument_overrides_filter_floor() {
    let source = Arc::new(FakeSource::new(20));
    let sync = orchestrator(source, &["k1"], 10_000);
    let mut req = request(0);
    req.filter.published_after = Some(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    req.published_after = video(4).published_at;
    let out = sync.sync(req).await.unwrap();
    let ids: Vec<&str> = out.videos.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["vid0000", "vid0001", "vid0002", "vid0003", "vid0004"]
    );
}

#[tokio::test]
async fn resolves_handles_through_the_cache() {
    let source = Arc::new(FakeSource::new(5));
    let sync = orchestrator(Arc::clone(&source), &["k1"], 10_000);
    let req = SyncRequest::new(ChannelRef::Handle("testchan".into()));
    let out = sync.sync(req.clone()).await.unwrap();
    assert_eq!(out.channel_id, CHANNEL);
    assert_eq!(out.stats.api_calls, 2);
    assert_eq!(out.stats.quota_units, 3);

    let again = sync.sync(req).await.unwrap();
    assert_eq!(again.stats.cache_hits, 2);
}

#[tokio::test]
async fn unknown_handle_is_not_found_without_retry() {
    let source = Arc::new(FakeSource::new(5));
    let sync = orchestrator(Arc::clone(&source), &["k1"], 10_000);
    let err = sync
        .sync(SyncRequest::new(ChannelRef::Handle("ghost".into())))
        .await
        .unwrap_err();
    assert!(matches!(err.error, SyncError::NotFound(_)));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn cancelled_token_stops_before_any_call() {
    let source = Arc::new(FakeSource::new(5));
    let sync = orchestrator(Arc::clone(&source), &["k1"], 10_000);
    let token = CancelToken::new();
    token.cancel();
    let mut req = request(0);
    req.cancel = Some(token);
    let err = sync.sync(req).await.unwrap_err();
    assert_eq!(err.error, SyncError::Cancelled);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn emits_progress_per_page() {
    let source = Arc::new(FakeSource::new(120));
    let (tx, mut rx) = ProgressSender::channel(16);
    let sync = orchestrator(source, &["k1"], 10_000).with_progress(tx);
    let mut req = request(0);
    req.job_id = Some(9);
    sync.sync(req).await.unwrap();
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.job_id == Some(9)));
    assert_eq!(events[2].current, 120);
}
