//! `tubesheet remove <id>` – remove a job.

use anyhow::{bail, Result};
use tubesheet_core::store::JobDb;

pub async fn run_remove(db: &JobDb, id: i64) -> Result<()> {
    if !db.remove_job(id).await? {
        bail!("job {id} not found");
    }
    println!("Removed job {id}");
    Ok(())
}
