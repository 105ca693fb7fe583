//! YouTube Data API v3 video source (API keys only).
//!
//! Channel resolution uses `channels.list` by handle or username. A page of
//! uploads is one `playlistItems.list` call on the channel's uploads playlist
//! (conditional on the page's ETag) followed by one `videos.list` call for
//! details of the ids on that page.

pub mod parse;

use async_trait::async_trait;

use crate::http::{self, HttpError, HttpResponse, HttpTimeouts};
use crate::model::{ChannelRef, VideoRecord};
use crate::source::{Fetched, SourceError, VideoPage, VideoSource};

use parse::{ChannelItem, PlaylistItem, VideoItem};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    base_url: String,
    page_size: u32,
    timeouts: HttpTimeouts,
}

impl YouTubeClient {
    pub fn new(page_size: u32, timeouts: HttpTimeouts) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, page_size, timeouts)
    }

    /// Point the client at another API root (local test servers).
    pub fn with_base_url(base_url: &str, page_size: u32, timeouts: HttpTimeouts) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.clamp(1, 50),
            timeouts,
        }
    }

    pub fn from_config(cfg: &crate::config::SyncConfig) -> Self {
        Self::new(cfg.page_size, HttpTimeouts::from_config(cfg))
    }

    fn url(&self, resource: &str, params: &[(&str, &str)]) -> Result<String, SourceError> {
        url::Url::parse_with_params(&format!("{}/{}", self.base_url, resource), params)
            .map(String::from)
            .map_err(|e| SourceError::InvalidInput(format!("{resource} URL: {e}")))
    }

    fn get(&self, url: &str, validator: Option<&str>) -> Result<HttpResponse, SourceError> {
        let mut headers = Vec::new();
        if let Some(v) = validator {
            headers.push(("If-None-Match", v));
        }
        http::get(url, &headers, self.timeouts).map_err(transport_error)
    }

    fn resolve_blocking(
        &self,
        channel: &ChannelRef,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<String>, SourceError> {
        let (param, value) = match channel {
            ChannelRef::Id(id) => return Ok(Fetched::modified(id.clone(), None)),
            ChannelRef::Handle(h) | ChannelRef::Custom(h) => ("forHandle", format!("@{h}")),
            ChannelRef::Username(u) => ("forUsername", u.clone()),
        };
        let url = self.url(
            "channels",
            &[("part", "id"), (param, &value), ("key", api_key)],
        )?;
        let resp = self.get(&url, validator)?;
        if resp.status == 304 {
            return Ok(Fetched::Unchanged);
        }
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body, "channels"));
        }
        let list = parse::parse_list::<ChannelItem>(&resp.body, "channels")?;
        let etag = resp.etag.or(list.etag);
        let id = list
            .items
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| SourceError::NotFound(format!("channel {channel}")))?;
        Ok(Fetched::modified(id, etag))
    }

    fn list_blocking(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<VideoPage>, SourceError> {
        let playlist = uploads_playlist(channel_id)?;
        let max_results = self.page_size.to_string();
        let mut params = vec![
            ("part", "contentDetails"),
            ("playlistId", playlist.as_str()),
            ("maxResults", max_results.as_str()),
            ("key", api_key),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let url = self.url("playlistItems", &params)?;
        let resp = self.get(&url, validator)?;
        if resp.status == 304 {
            return Ok(Fetched::Unchanged);
        }
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body, "playlistItems"));
        }
        let list = parse::parse_list::<PlaylistItem>(&resp.body, "playlistItems")?;
        let etag = resp.etag.or(list.etag);
        let ids: Vec<String> = list
            .items
            .into_iter()
            .map(|i| i.content_details.video_id)
            .collect();

        let videos = self.video_details(channel_id, &ids, api_key)?;
        Ok(Fetched::modified(
            VideoPage {
                videos,
                next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
            },
            etag,
        ))
    }

    /// Details for `ids`, returned in the order of `ids`. Ids the API no
    /// longer knows (deleted or private videos) are dropped.
    fn video_details(
        &self,
        channel_id: &str,
        ids: &[String],
        api_key: &str,
    ) -> Result<Vec<VideoRecord>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let url = self.url(
            "videos",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("id", joined.as_str()),
                ("key", api_key),
            ],
        )?;
        let resp = self.get(&url, None)?;
        if !resp.is_success() {
            return Err(parse::error_from_response(resp.status, &resp.body, "videos"));
        }
        let list = parse::parse_list::<VideoItem>(&resp.body, "videos")?;
        let mut by_id: std::collections::HashMap<String, VideoItem> =
            list.items.into_iter().map(|v| (v.id.clone(), v)).collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(|item| item.into_record(channel_id))
            .collect())
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn resolve_channel(
        &self,
        channel: &ChannelRef,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<String>, SourceError> {
        let client = self.clone();
        let channel = channel.clone();
        let validator = validator.map(str::to_string);
        let api_key = api_key.to_string();
        tokio::task::spawn_blocking(move || {
            client.resolve_blocking(&channel, validator.as_deref(), &api_key)
        })
        .await
        .map_err(|e| SourceError::Other(format!("resolve task join: {e}")))?
    }

    async fn list_videos(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
        validator: Option<&str>,
        api_key: &str,
    ) -> Result<Fetched<VideoPage>, SourceError> {
        let client = self.clone();
        let channel_id = channel_id.to_string();
        let page_token = page_token.map(str::to_string);
        let validator = validator.map(str::to_string);
        let api_key = api_key.to_string();
        tokio::task::spawn_blocking(move || {
            client.list_blocking(
                &channel_id,
                page_token.as_deref(),
                validator.as_deref(),
                &api_key,
            )
        })
        .await
        .map_err(|e| SourceError::Other(format!("list task join: {e}")))?
    }
}

/// Every channel's uploads live in the playlist `UU` + the id after `UC`.
pub fn uploads_playlist(channel_id: &str) -> Result<String, SourceError> {
    match channel_id.strip_prefix("UC") {
        Some(rest) if !rest.is_empty() => Ok(format!("UU{rest}")),
        _ => Err(SourceError::InvalidInput(format!(
            "not a channel id: {channel_id}"
        ))),
    }
}

fn transport_error(e: HttpError) -> SourceError {
    match e {
        HttpError::Timeout(m) => SourceError::Timeout(m),
        HttpError::Connection(m) => SourceError::Connection(m),
        HttpError::Other(m) => SourceError::Other(m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_playlist_from_channel_id() {
        assert_eq!(
            uploads_playlist("UC_x5XG1OV2P6uZZ5FSM9Ttw").unwrap(),
            "UU_x5XG1OV2P6uZZ5FSM9Ttw"
        );
        assert!(uploads_playlist("UC").is_err());
        assert!(uploads_playlist("PL123").is_err());
    }

    #[test]
    fn urls_are_encoded() {
        let client =
            YouTubeClient::with_base_url("http://localhost:1/v3/", 500, HttpTimeouts::default());
        assert_eq!(client.page_size, 50);
        let url = client
            .url(
                "channels",
                &[("part", "id"), ("forHandle", "@a b"), ("key", "k")],
            )
            .unwrap();
        assert_eq!(
            url,
            "http://localhost:1/v3/channels?part=id&forHandle=%40a+b&key=k"
        );
    }

    #[tokio::test]
    async fn raw_ids_resolve_without_request() {
        let client =
            YouTubeClient::with_base_url("http://127.0.0.1:9", 50, HttpTimeouts::default());
        let out = client
            .resolve_channel(&ChannelRef::Id("UCabc".into()), None, "k")
            .await
            .unwrap();
        assert_eq!(out, Fetched::modified("UCabc".to_string(), None));
    }
}
