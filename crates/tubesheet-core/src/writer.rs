//! Batch writer: turn video records into rows and append them to a
//! destination in bounded batches.

use async_trait::async_trait;

use crate::control::CancelToken;
use crate::error::SyncError;
use crate::model::{Destination, VideoRecord};

/// Errors reported by a row destination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DestinationError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    #[error("not authorized: {0}")]
    Auth(String),
}

/// Append-only row destination (a spreadsheet tab).
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Append `rows` at the end of the tab. Returns the number of rows written.
    async fn append_rows(
        &self,
        destination: &Destination,
        rows: Vec<Vec<String>>,
    ) -> Result<usize, DestinationError>;
}

pub const HEADER: [&str; 9] = [
    "Video ID",
    "Title",
    "Published",
    "Duration (s)",
    "Views",
    "Likes",
    "Comments",
    "Channel ID",
    "URL",
];

pub fn header_row() -> Vec<String> {
    HEADER.iter().map(|s| s.to_string()).collect()
}

pub fn video_row(video: &VideoRecord) -> Vec<String> {
    vec![
        video.id.clone(),
        video.title.clone(),
        video
            .published_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        video
            .duration_seconds
            .map(|d| d.to_string())
            .unwrap_or_default(),
        video.view_count.to_string(),
        video.like_count.to_string(),
        video.comment_count.to_string(),
        video.channel_id.clone(),
        video.url(),
    ]
}

/// Result of a write. `written` counts video rows only (not the header) and
/// the ids of those rows are the first `written` of the input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    pub written: usize,
    pub batches: usize,
    pub error: Option<SyncError>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    batch_size: usize,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(500)
    }
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Append `records` in order, one batch at a time. Stops at the first
    /// failing batch; rows from earlier batches stay written. The header row,
    /// when requested, travels with the first batch. A batch the destination
    /// only partly accepts counts as a failure at the accepted prefix.
    pub async fn write(
        &self,
        sink: &dyn RowSink,
        destination: &Destination,
        records: &[VideoRecord],
        include_header: bool,
        cancel: Option<&CancelToken>,
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        for (i, chunk) in records.chunks(self.batch_size).enumerate() {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                outcome.error = Some(partial_or(outcome.written, SyncError::Cancelled));
                return outcome;
            }
            let with_header = include_header && i == 0;
            let mut rows = Vec::with_capacity(chunk.len() + usize::from(with_header));
            if with_header {
                rows.push(header_row());
            }
            rows.extend(chunk.iter().map(video_row));

            let sent = rows.len();
            match sink.append_rows(destination, rows).await {
                Ok(accepted) if accepted < sent => {
                    let videos = accepted.saturating_sub(usize::from(with_header));
                    outcome.written += videos;
                    tracing::warn!(
                        destination = %destination,
                        accepted,
                        sent,
                        written = outcome.written,
                        "destination accepted a short batch"
                    );
                    outcome.error = Some(SyncError::PartialWrite {
                        written: outcome.written,
                        reason: format!("destination accepted {accepted} of {sent} rows"),
                    });
                    return outcome;
                }
                Ok(_) => {
                    outcome.written += chunk.len();
                    outcome.batches += 1;
                    tracing::debug!(
                        destination = %destination,
                        batch = outcome.batches,
                        rows = chunk.len(),
                        "batch appended"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        destination = %destination,
                        written = outcome.written,
                        "batch append failed: {}",
                        e
                    );
                    let error = match e {
                        DestinationError::InvalidDestination(what) if outcome.written == 0 => {
                            SyncError::InvalidInput(what)
                        }
                        other => SyncError::PartialWrite {
                            written: outcome.written,
                            reason: other.to_string(),
                        },
                    };
                    outcome.error = Some(error);
                    return outcome;
                }
            }
        }
        outcome
    }
}

fn partial_or(written: usize, error: SyncError) -> SyncError {
    if written == 0 {
        error
    } else {
        SyncError::PartialWrite {
            written,
            reason: error.to_string(),
        }
    }
}
