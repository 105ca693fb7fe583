//! Sync control for cancel: shared cancel tokens and the socket path used for IPC.
//!
//! When the scheduler runs with a `SyncControl`, each running job is
//! registered with a token. A control client (`tubesheet cancel 3` via the
//! socket) requests cancellation; the orchestrator checks the token between
//! pages and the writer between batches.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Cancellation flag shared between a running job and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Registry of job id -> cancel token for jobs currently running.
#[derive(Debug, Default)]
pub struct SyncControl {
    jobs: RwLock<HashMap<i64, CancelToken>>,
}

impl SyncControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job and return its token.
    pub fn register(&self, job_id: i64) -> CancelToken {
        let token = CancelToken::new();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, token.clone());
        token
    }

    /// Unregister a job (call when the job finishes, success or failure).
    pub fn unregister(&self, job_id: i64) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    /// Request cancellation. Returns false when the job is not running here.
    pub fn request_cancel(&self, job_id: i64) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered job (Ctrl-C).
    pub fn cancel_all(&self) {
        for token in self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            token.cancel();
        }
    }

    pub fn running_jobs(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Default path for the control socket (same XDG state dir as the DB).
pub fn default_control_socket_path() -> anyhow::Result<PathBuf> {
    Ok(crate::config::state_dir()?.join("control.sock"))
}
