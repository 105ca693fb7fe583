//! One upstream request through the key pool, the response cache and the
//! retry policy.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SyncError;
use crate::quota::{redact, Endpoint};
use crate::retry::{self, run_with_retry, ErrorKind};
use crate::source::{Fetched, SourceError};

use super::{ChannelSync, SyncStats};

impl ChannelSync {
    /// Fetch `cache_key` with whichever key the pool hands out.
    ///
    /// A key rejected for quota is failed at once and the request moves to
    /// the next key. Transient errors are retried with backoff on the same
    /// key; once retries run out the key is failed and the request moves on,
    /// unless it was the last active key, in which case the transient error
    /// is returned. Every other error aborts.
    pub(super) async fn keyed_fetch<T, C, Fut>(
        &self,
        endpoint: Endpoint,
        cache_key: &str,
        stats: &mut SyncStats,
        call: C,
    ) -> Result<T, SyncError>
    where
        T: Serialize + DeserializeOwned,
        C: Fn(String, Option<String>) -> Fut,
        Fut: Future<Output = Result<Fetched<T>, SourceError>>,
    {
        loop {
            let api_key = self.keys.acquire(Utc::now())?;
            let attempts = AtomicU32::new(0);
            let result = {
                let (call, attempts, api_key) = (&call, &attempts, &api_key);
                self.cache
                    .fetch_or_validate(cache_key, move |validator| {
                        run_with_retry(&self.retry, move |_attempt| {
                            attempts.fetch_add(1, Ordering::Relaxed);
                            call(api_key.clone(), validator.clone())
                        })
                    })
                    .await
            };
            stats.api_calls += attempts.load(Ordering::Relaxed);

            let err = match result {
                Ok(outcome) => {
                    let units = if outcome.hit {
                        stats.cache_hits += 1;
                        self.validation_cost_units
                    } else {
                        endpoint.cost()
                    };
                    self.keys.charge(&api_key, endpoint, units);
                    stats.quota_units += u64::from(units);
                    return Ok(outcome.payload);
                }
                Err(err) => err,
            };

            match retry::classify(&err) {
                ErrorKind::QuotaExceeded => {
                    tracing::warn!(
                        key = %redact(&api_key),
                        endpoint = endpoint.as_str(),
                        "API key rejected: {}",
                        err
                    );
                    self.keys.fail_key(&api_key);
                }
                kind if kind.is_transient() => {
                    if self.keys.active_count() <= 1 {
                        return Err(SyncError::Transient(err.to_string()));
                    }
                    tracing::warn!(
                        key = %redact(&api_key),
                        endpoint = endpoint.as_str(),
                        "retries exhausted, moving to next key: {}",
                        err
                    );
                    self.keys.fail_key(&api_key);
                }
                _ => return Err(SyncError::from(err)),
            }
        }
    }
}
