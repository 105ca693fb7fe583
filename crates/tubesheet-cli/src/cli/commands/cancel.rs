//! `tubesheet cancel <id>` – ask the running `tubesheet` process to cancel a job.

use anyhow::Result;

use crate::cli::control_socket;

pub async fn run_cancel(id: i64) -> Result<bool> {
    let path = tubesheet_core::control::default_control_socket_path()?;
    let cancelled = control_socket::send_cancel(&path, id).await?;
    if cancelled {
        println!("Cancel requested for job {id}");
    } else {
        println!("Job {id} is not running");
    }
    Ok(cancelled)
}
