//! Parse YouTube Data API v3 JSON bodies and error envelopes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::VideoRecord;
use crate::source::SourceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse<T> {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelItem {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistItem {
    pub content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistItemDetails {
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoItem {
    pub id: String,
    #[serde(default)]
    pub snippet: Snippet,
    #[serde(default)]
    pub content_details: VideoDetails,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Snippet {
    pub title: String,
    pub description: String,
    pub published_at: Option<String>,
    pub channel_id: String,
    pub channel_title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VideoDetails {
    pub duration: Option<String>,
}

/// Counts arrive as decimal strings and are omitted when hidden.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Statistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

pub(crate) fn parse_list<T: for<'de> Deserialize<'de>>(
    body: &[u8],
    what: &str,
) -> Result<ListResponse<T>, SourceError> {
    serde_json::from_slice(body)
        .map_err(|e| SourceError::Other(format!("parse {what} response: {e}")))
}

impl VideoItem {
    pub(crate) fn into_record(self, fallback_channel_id: &str) -> VideoRecord {
        let count = |s: &Option<String>| s.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
        let channel_id = if self.snippet.channel_id.is_empty() {
            fallback_channel_id.to_string()
        } else {
            self.snippet.channel_id
        };
        VideoRecord {
            view_count: count(&self.statistics.view_count),
            like_count: count(&self.statistics.like_count),
            comment_count: count(&self.statistics.comment_count),
            id: self.id,
            title: self.snippet.title,
            description: self.snippet.description,
            published_at: self.snippet.published_at.as_deref().and_then(parse_timestamp),
            duration_seconds: self.content_details.duration.as_deref().and_then(parse_duration),
            channel_id,
            channel_title: self.snippet.channel_title,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Parse an ISO-8601 duration as used for video lengths (`PT1H2M3S`,
/// `P1DT2H`, `P0D`) into whole seconds. Year and month designators are
/// ambiguous in length and yield `None`, as does anything malformed.
pub fn parse_duration(s: &str) -> Option<u64> {
    let rest = s.trim().strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((d, t)) if !t.is_empty() => (d, Some(t)),
        Some(_) => return None,
        None => (rest, None),
    };
    if date.is_empty() && time.is_none() {
        return None;
    }

    let mut total: u64 = 0;
    for (value, unit) in components(date)? {
        let secs = match unit {
            'W' => 7 * 86_400,
            'D' => 86_400,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(secs)?)?;
    }
    if let Some(time) = time {
        for (value, unit) in components(time)? {
            let secs = match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return None,
            };
            total = total.checked_add(value.checked_mul(secs)?)?;
        }
    }
    Some(total)
}

/// Split `12H3M4.5S` into `[(12,'H'), (3,'M'), (4,'S')]`; fractions are truncated.
fn components(s: &str) -> Option<Vec<(u64, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
        } else {
            if number.is_empty() {
                return None;
            }
            let whole = number.split('.').next().unwrap_or_default();
            out.push((whole.parse().ok()?, c));
            number.clear();
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(out)
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDetail {
    reason: String,
}

/// Map a non-success API response onto `SourceError`. The `reason` field of
/// the error envelope wins over the HTTP status.
pub(crate) fn error_from_response(status: u16, body: &[u8], what: &str) -> SourceError {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).unwrap_or_default();
    let reason = envelope
        .error
        .errors
        .first()
        .map(|d| d.reason.as_str())
        .unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        format!("{what}: HTTP {status}")
    } else {
        format!("{what}: {}", envelope.error.message)
    };
    match reason {
        "quotaExceeded" | "dailyLimitExceeded" | "keyInvalid" | "keyExpired" => {
            SourceError::QuotaExceeded(format!("{reason}: {message}"))
        }
        "rateLimitExceeded" | "userRateLimitExceeded" => SourceError::Http {
            status: 429,
            message,
        },
        "channelNotFound" | "playlistNotFound" | "videoNotFound" => SourceError::NotFound(message),
        _ => match status {
            404 => SourceError::NotFound(message),
            400 => SourceError::InvalidInput(message),
            _ => SourceError::Http { status, message },
        },
    }
}
