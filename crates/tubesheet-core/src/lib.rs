pub mod config;
pub mod logging;

pub mod cache;
pub mod control;
pub mod dedupe;
pub mod error;
pub mod filter;
pub mod http;
pub mod model;
pub mod progress;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod sheets;
pub mod source;
pub mod store;
pub mod sync;
pub mod writer;
pub mod youtube;
