//! Wires the engine for `run` and `sync`: YouTube source, Sheets sink, key
//! pool, persisted response cache, control socket, Ctrl-C and a progress
//! printer.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tubesheet_core::cache::ResponseCache;
use tubesheet_core::config::{self, SyncConfig};
use tubesheet_core::control::SyncControl;
use tubesheet_core::http::HttpTimeouts;
use tubesheet_core::progress::{ProgressEvent, ProgressSender};
use tubesheet_core::quota::KeyPool;
use tubesheet_core::scheduler::Scheduler;
use tubesheet_core::sheets::SheetsSink;
use tubesheet_core::store::JobDb;
use tubesheet_core::sync::ChannelSync;
use tubesheet_core::youtube::YouTubeClient;

use crate::cli::control_socket;

const PROGRESS_CAPACITY: usize = 64;

pub struct Engine {
    pub scheduler: Scheduler,
    cache: Arc<ResponseCache>,
    cache_path: Option<PathBuf>,
    printer: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn start(db: &JobDb, cfg: &SyncConfig) -> Result<Self> {
        let keys = cfg.effective_api_keys();
        if keys.is_empty() {
            let path = config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.toml".to_string());
            bail!(
                "no API keys configured: add api_keys to {} or set {}",
                path,
                config::API_KEYS_ENV
            );
        }

        let cache_path = ResponseCache::default_path().ok();
        let cache = match cache_path.as_deref().map(ResponseCache::load_from_path) {
            Some(Ok(Some(cache))) => {
                tracing::debug!(entries = cache.len(), "loaded response cache");
                cache
            }
            Some(Err(e)) => {
                tracing::warn!("ignoring unreadable response cache: {:#}", e);
                ResponseCache::new()
            }
            _ => ResponseCache::new(),
        };
        let cache = Arc::new(cache);

        let (progress, rx) = ProgressSender::channel(PROGRESS_CAPACITY);
        let printer = tokio::spawn(print_progress(rx));

        let pool = KeyPool::new(keys, cfg.daily_quota_units, cfg.thresholds());
        let sync = ChannelSync::new(
            Arc::new(YouTubeClient::from_config(cfg)),
            pool,
            Arc::clone(&cache),
        )
        .with_retry(cfg.retry_policy())
        .with_validation_cost(cfg.validation_cost_units)
        .with_progress(progress.clone());
        let sink = SheetsSink::from_env(HttpTimeouts::from_config(cfg));

        let control = Arc::new(SyncControl::new());
        let mut background = Vec::new();
        if let Ok(socket_path) = tubesheet_core::control::default_control_socket_path() {
            if let Ok(handle) =
                control_socket::spawn_control_listener(Arc::clone(&control), &socket_path)
            {
                tracing::debug!(path = %socket_path.display(), "control socket listening");
                background.push(handle);
            }
        }
        let on_interrupt = Arc::clone(&control);
        background.push(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupted: cancelling running jobs");
                on_interrupt.cancel_all();
            }
        }));

        let scheduler = Scheduler::new(
            Arc::new(db.clone()),
            Arc::new(sync),
            Arc::new(sink),
            cfg,
        )
        .with_control(control)
        .with_progress(progress);

        Ok(Self {
            scheduler,
            cache,
            cache_path,
            printer,
            background,
        })
    }

    /// Stop background tasks, flush progress output and persist the cache.
    pub async fn finish(self) {
        for report in self.scheduler.channel_sync().keys().report() {
            tracing::info!(
                key = %report.label,
                status = ?report.status,
                used = report.report.used,
                budget = report.report.budget,
                level = report.report.level.as_str(),
                "quota usage"
            );
        }
        for (endpoint, units) in self.scheduler.channel_sync().keys().endpoint_breakdown() {
            tracing::info!(
                endpoint = endpoint.as_str(),
                units,
                "quota usage by endpoint"
            );
        }
        for handle in &self.background {
            handle.abort();
        }
        drop(self.scheduler);
        let _ = self.printer.await;

        if let Some(path) = self.cache_path {
            if let Err(e) = self.cache.save_to_path(&path) {
                tracing::warn!(
                    "could not save response cache to {}: {:#}",
                    path.display(),
                    e
                );
            }
        }
    }
}

async fn print_progress(mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>) {
    while let Some(ev) = rx.recv().await {
        let job = ev
            .job_id
            .map(|id| format!("[job {id}] "))
            .unwrap_or_default();
        match ev.total {
            Some(total) => println!("  {job}{} ({}/{})", ev.message, ev.current, total),
            None => println!("  {job}{} ({})", ev.message, ev.current),
        }
    }
}
