//! `tubesheet sync <id>` – run one job now.

use anyhow::Result;
use chrono::Utc;
use tubesheet_core::config::SyncConfig;
use tubesheet_core::store::JobDb;

use super::run::print_result;
use crate::cli::engine::Engine;

pub async fn run_sync(db: &JobDb, cfg: &SyncConfig, id: i64) -> Result<bool> {
    let engine = Engine::start(db, cfg)?;
    let now = Utc::now();
    let outcome = match engine.scheduler.recover_orphans(now).await {
        Ok(_) => engine.scheduler.run(id, now).await,
        Err(e) => Err(e),
    };
    engine.finish().await;
    let result = outcome?;
    print_result(&result);
    Ok(result.succeeded())
}
