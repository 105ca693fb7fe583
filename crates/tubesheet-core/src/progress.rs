//! Progress events for UIs: page fetches and batch writes, fire-and-forget.

use tokio::sync::mpsc;

/// One progress update. `total` is `None` when the end is not known yet
/// (pagination before the last page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: Option<i64>,
    pub current: u64,
    pub total: Option<u64>,
    pub message: String,
}

/// Sender side of the bounded progress channel. Events are dropped when the
/// channel is full or closed; the sync never waits on a slow consumer.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender(Option<mpsc::Sender<ProgressEvent>>);

impl ProgressSender {
    /// Bounded channel with room for `capacity` pending events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self(Some(tx)), rx)
    }

    /// A sender that discards everything.
    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn emit(
        &self,
        job_id: Option<i64>,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) {
        if let Some(tx) = &self.0 {
            let _ = tx.try_send(ProgressEvent {
                job_id,
                current,
                total,
                message: message.into(),
            });
        }
    }
}
