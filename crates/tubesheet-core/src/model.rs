//! Records that flow through the engine: videos, channel references and
//! spreadsheet destinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncError;

/// Metadata for one video. Built once by the source and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Stable video id, unique within a channel.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// `None` when the upstream duration was missing or unparseable.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
}

impl VideoRecord {
    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// A user-supplied channel reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelRef {
    /// Canonical `UC…` channel id; needs no resolution call.
    Id(String),
    /// `@handle` (stored without the `@`).
    Handle(String),
    /// Legacy `/user/<name>` URL.
    Username(String),
    /// `/c/<name>` custom URL.
    Custom(String),
}

impl ChannelRef {
    /// Parse a raw id, an `@handle`, or a youtube.com channel URL.
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(SyncError::InvalidInput("empty channel reference".into()));
        }
        if is_channel_id(s) {
            return Ok(ChannelRef::Id(s.to_string()));
        }
        if let Some(handle) = s.strip_prefix('@') {
            return handle_ref(handle, input);
        }
        if s.contains("youtube.com") || s.contains("://") {
            return parse_channel_url(s);
        }
        if s.contains('/') || s.contains(char::is_whitespace) {
            return Err(SyncError::InvalidInput(format!(
                "unrecognized channel reference: {input}"
            )));
        }
        handle_ref(s, input)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Handle(h) => write!(f, "@{h}"),
            ChannelRef::Username(u) => write!(f, "youtube.com/user/{u}"),
            ChannelRef::Custom(c) => write!(f, "youtube.com/c/{c}"),
        }
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_channel_id(s: &str) -> bool {
    s.len() == 24 && s.starts_with("UC") && s.chars().all(is_id_char)
}

fn handle_ref(handle: &str, input: &str) -> Result<ChannelRef, SyncError> {
    let valid = !handle.is_empty()
        && handle
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(ChannelRef::Handle(handle.to_string()))
    } else {
        Err(SyncError::InvalidInput(format!("invalid channel handle: {input}")))
    }
}

fn parse_channel_url(s: &str) -> Result<ChannelRef, SyncError> {
    let with_scheme = if s.contains("://") {
        s.to_string()
    } else {
        format!("https://{s}")
    };
    let url = url::Url::parse(&with_scheme)
        .map_err(|e| SyncError::InvalidInput(format!("channel URL {s}: {e}")))?;
    let host = url.host_str().unwrap_or_default();
    if !(host == "youtube.com" || host.ends_with(".youtube.com")) {
        return Err(SyncError::InvalidInput(format!("not a YouTube URL: {s}")));
    }
    let segments: Vec<&str> = url
        .path_segments()
        .map(|it| it.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        ["channel", id, ..] if is_channel_id(id) => Ok(ChannelRef::Id(id.to_string())),
        ["user", name, ..] => Ok(ChannelRef::Username(name.to_string())),
        ["c", name, ..] => Ok(ChannelRef::Custom(name.to_string())),
        [first, ..] if first.starts_with('@') => handle_ref(first.trim_start_matches('@'), s),
        _ => Err(SyncError::InvalidInput(format!(
            "URL does not name a channel: {s}"
        ))),
    }
}

/// A spreadsheet tab that receives rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub spreadsheet_id: String,
    pub tab: String,
}

impl Destination {
    /// Build a destination from a spreadsheet id (or its docs.google.com URL) and a tab name.
    pub fn new(spreadsheet: &str, tab: &str) -> Result<Self, SyncError> {
        let spreadsheet_id = spreadsheet_id_from(spreadsheet.trim())?;
        let tab = tab.trim();
        if tab.is_empty() {
            return Err(SyncError::InvalidInput("empty destination tab name".into()));
        }
        Ok(Self {
            spreadsheet_id,
            tab: tab.to_string(),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.spreadsheet_id, self.tab)
    }
}

fn spreadsheet_id_from(s: &str) -> Result<String, SyncError> {
    if s.is_empty() {
        return Err(SyncError::InvalidInput("empty spreadsheet id".into()));
    }
    if !s.contains("://") {
        if s.chars().all(is_id_char) {
            return Ok(s.to_string());
        }
        return Err(SyncError::InvalidInput(format!("malformed spreadsheet id: {s}")));
    }
    let url = url::Url::parse(s)
        .map_err(|e| SyncError::InvalidInput(format!("spreadsheet URL {s}: {e}")))?;
    let mut segments = url.path_segments().into_iter().flatten();
    while let Some(seg) = segments.next() {
        if seg == "d" {
            if let Some(id) = segments.next().filter(|id| !id.is_empty()) {
                return Ok(id.to_string());
            }
        }
    }
    Err(SyncError::InvalidInput(format!(
        "URL does not name a spreadsheet: {s}"
    )))
}
