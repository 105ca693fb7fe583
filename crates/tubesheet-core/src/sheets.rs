//! Google Sheets `values.append` destination.
//!
//! Authenticates with a bearer token taken from `TUBESHEET_SHEETS_TOKEN`;
//! obtaining that token (OAuth, service accounts) happens outside tubesheet.

use async_trait::async_trait;
use serde::Deserialize;

use crate::http::{self, HttpError, HttpTimeouts};
use crate::model::Destination;
use crate::writer::{DestinationError, RowSink};

pub const TOKEN_ENV: &str = "TUBESHEET_SHEETS_TOKEN";
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";

#[derive(Debug, Clone)]
pub struct SheetsSink {
    base_url: String,
    token: String,
    timeouts: HttpTimeouts,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AppendUpdates {
    updated_rows: Option<usize>,
}

impl SheetsSink {
    pub fn new(token: impl Into<String>, timeouts: HttpTimeouts) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token, timeouts)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>, timeouts: HttpTimeouts) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            timeouts,
        }
    }

    /// Sink using the token from the environment. Missing token is an error
    /// only when rows are actually written.
    pub fn from_env(timeouts: HttpTimeouts) -> Self {
        Self::new(std::env::var(TOKEN_ENV).unwrap_or_default(), timeouts)
    }

    fn append_url(&self, destination: &Destination) -> Result<String, DestinationError> {
        let range = format!("'{}'!A1:append", destination.tab.replace('\'', "''"));
        let mut url = url::Url::parse(&self.base_url).map_err(|e| {
            DestinationError::InvalidDestination(format!("base URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                DestinationError::InvalidDestination(format!("base URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "spreadsheets",
                destination.spreadsheet_id.as_str(),
                "values",
                range.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url.into())
    }

    fn append_blocking(
        &self,
        destination: &Destination,
        rows: &[Vec<String>],
    ) -> Result<usize, DestinationError> {
        if self.token.trim().is_empty() {
            return Err(DestinationError::Auth(format!("{TOKEN_ENV} is not set")));
        }
        let body = serde_json::to_vec(&serde_json::json!({
            "majorDimension": "ROWS",
            "values": rows,
        }))
        .map_err(|e| DestinationError::Transport(format!("encode rows: {e}")))?;
        let auth = format!("Bearer {}", self.token);
        let resp = http::post_json(
            &self.append_url(destination)?,
            &[("Authorization", auth.as_str())],
            &body,
            self.timeouts,
        )
        .map_err(|e| match e {
            HttpError::Timeout(m) | HttpError::Connection(m) | HttpError::Other(m) => {
                DestinationError::Transport(m)
            }
        })?;

        match resp.status {
            200..=299 => {
                let parsed: Option<AppendResponse> = serde_json::from_slice(&resp.body).ok();
                Ok(parsed
                    .and_then(|r| r.updates.updated_rows)
                    .unwrap_or(rows.len()))
            }
            401 | 403 => Err(DestinationError::Auth(format!(
                "HTTP {}: {}",
                resp.status,
                snippet(&resp.body_text())
            ))),
            400 | 404 => Err(DestinationError::InvalidDestination(format!(
                "{destination}: HTTP {}: {}",
                resp.status,
                snippet(&resp.body_text())
            ))),
            status => Err(DestinationError::Http {
                status,
                message: snippet(&resp.body_text()),
            }),
        }
    }
}

#[async_trait]
impl RowSink for SheetsSink {
    async fn append_rows(
        &self,
        destination: &Destination,
        rows: Vec<Vec<String>>,
    ) -> Result<usize, DestinationError> {
        let sink = self.clone();
        let destination = destination.clone();
        tokio::task::spawn_blocking(move || sink.append_blocking(&destination, &rows))
            .await
            .map_err(|e| DestinationError::Transport(format!("append task join: {e}")))?
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
