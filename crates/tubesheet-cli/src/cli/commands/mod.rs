//! CLI command handlers, one per file.

mod add;
mod cancel;
mod due;
mod history;
mod remove;
mod run;
mod status;
mod sync;

pub use add::{run_add, AddArgs};
pub use cancel::run_cancel;
pub use due::run_due;
pub use history::run_history;
pub use remove::run_remove;
pub use run::run_scheduler;
pub use status::run_status;
pub use sync::run_sync;
