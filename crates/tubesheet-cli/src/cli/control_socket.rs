//! Control socket: server (during `tubesheet run` / `sync`) and client (for
//! `tubesheet cancel`). Protocol: one line per command, "cancel <id>"; the
//! server answers "cancelled <id>" or "not-running <id>".

use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tubesheet_core::control::SyncControl;

/// Spawns a task that listens on `path` and calls `control.request_cancel(id)`
/// for each "cancel <id>" line. Ignores malformed lines.
pub fn spawn_control_listener(
    control: Arc<SyncControl>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let control = Arc::clone(&control);
                    tokio::spawn(serve(stream, control));
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(stream: UnixStream, control: Arc<SyncControl>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(id) = parse_cancel(&line) else {
            continue;
        };
        let reply = if control.request_cancel(id) {
            tracing::info!(job_id = id, "cancel requested over control socket");
            format!("cancelled {id}\n")
        } else {
            format!("not-running {id}\n")
        };
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn parse_cancel(line: &str) -> Option<i64> {
    line.trim().strip_prefix("cancel ")?.trim().parse().ok()
}

/// Sends "cancel <job_id>" and waits for the answer. `Ok(false)` when the
/// job is not running in the process behind the socket.
pub async fn send_cancel(socket_path: &Path, job_id: i64) -> Result<bool> {
    if !socket_path.exists() {
        bail!(
            "no tubesheet run is active (no socket at {})",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path).await?;
    let (read, mut write) = stream.into_split();
    let request = format!("cancel {job_id}\n");
    write.write_all(request.as_bytes()).await?;
    let mut lines = BufReader::new(read).lines();
    match lines.next_line().await? {
        Some(reply) => Ok(reply.trim() == format!("cancelled {job_id}")),
        None => bail!("control socket closed without answering"),
    }
}
