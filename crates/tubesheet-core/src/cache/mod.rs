//! Conditional-fetch response cache.
//!
//! Each entry holds the validator (ETag) the upstream handed out together
//! with the payload it validated. On the next request for the same key the
//! validator is presented; an "unchanged" answer returns the stored payload
//! without a full refetch. There is no TTL: staleness is the upstream's call.
//!
//! Calls for the same key are serialized by a per-key async lock so a
//! validator is never read while another task is replacing it. Different keys
//! proceed concurrently.

mod persist;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::source::{Fetched, SourceError};

/// Deterministic cache key for an endpoint call: SHA-256 over the endpoint
/// name and its parameters sorted by name.
pub fn request_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    for (name, value) in sorted {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub validator: String,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// Payload returned by `fetch_or_validate`; `hit` is true when it came from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOutcome<T> {
    pub payload: T,
    pub hit: bool,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Drop per-key locks nobody is holding. In-flight calls keep their own
    /// clone of the lock, so their entry survives.
    fn prune_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Run `supplier` with the stored validator (if any) and reconcile its answer
    /// with the cache.
    ///
    /// - `Unchanged` with an entry: the cached payload, `hit = true`.
    /// - `Unchanged` without an entry: error, there is nothing to return.
    /// - `Modified`: the fresh payload, `hit = false`; stored when it carries a
    ///   validator, otherwise any old entry for the key is dropped.
    ///
    /// Supplier errors pass through and leave the cache untouched.
    pub async fn fetch_or_validate<T, F, Fut>(
        &self,
        key: &str,
        supplier: F,
    ) -> Result<CacheOutcome<T>, SourceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<Fetched<T>, SourceError>>,
    {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let validator = self.entries().get(key).map(|e| e.validator.clone());
        match supplier(validator).await? {
            Fetched::Unchanged => {
                let mut entries = self.entries();
                let Some(entry) = entries.get_mut(key) else {
                    return Err(SourceError::Other(
                        "upstream reported unchanged for an uncached request".into(),
                    ));
                };
                entry.fetched_at = Utc::now();
                let payload = serde_json::from_value(entry.payload.clone())
                    .map_err(|e| SourceError::Other(format!("decode cached payload: {e}")))?;
                tracing::debug!(key = %short(key), "cache hit (validator still current)");
                Ok(CacheOutcome { payload, hit: true })
            }
            Fetched::Modified { payload, validator } => {
                match validator {
                    Some(validator) => {
                        let value = serde_json::to_value(&payload)
                            .map_err(|e| SourceError::Other(format!("encode payload: {e}")))?;
                        self.entries().insert(
                            key.to_string(),
                            CacheEntry {
                                key: key.to_string(),
                                validator,
                                payload: value,
                                fetched_at: Utc::now(),
                            },
                        );
                    }
                    None => {
                        self.entries().remove(key);
                    }
                }
                Ok(CacheOutcome {
                    payload,
                    hit: false,
                })
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries().clear();
        self.prune_locks();
    }

    /// All entries, ordered by key.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        let mut out: Vec<CacheEntry> = self.entries().values().cloned().collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Replace the contents with `entries`.
    pub fn restore(&self, entries: Vec<CacheEntry>) {
        let mut map = self.entries();
        map.clear();
        for e in entries {
            map.insert(e.key.clone(), e);
        }
        drop(map);
        self.prune_locks();
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn request_key_ignores_param_order() {
        let forward = [("playlistId", "UU1"), ("pageToken", "p2")];
        let reversed = [("pageToken", "p2"), ("playlistId", "UU1")];
        let a = request_key("playlistItems", &forward);
        let b = request_key("playlistItems", &reversed);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, request_key("playlistItems", &[("playlistId", "UU1")]));
        assert_ne!(a, request_key("channels", &forward));
    }

    #[tokio::test]
    async fn unchanged_returns_cached_payload() {
        let cache = ResponseCache::new();
        let first = cache
            .fetch_or_validate("k", |v| async move {
                assert_eq!(v, None);
                Ok(Fetched::modified(vec![1u32, 2, 3], Some("etag-1".into())))
            })
            .await
            .unwrap();
        assert!(!first.hit);

        let second: CacheOutcome<Vec<u32>> = cache
            .fetch_or_validate("k", |v| async move {
                assert_eq!(v.as_deref(), Some("etag-1"));
                Ok(Fetched::Unchanged)
            })
            .await
            .unwrap();
        assert!(second.hit);
        assert_eq!(second.payload, first.payload);
    }

    #[tokio::test]
    async fn modified_replaces_entry() {
        let cache = ResponseCache::new();
        cache
            .fetch_or_validate("k", |_| async {
                Ok(Fetched::modified("old".to_string(), Some("e1".into())))
            })
            .await
            .unwrap();
        let out = cache
            .fetch_or_validate("k", |_| async {
                Ok(Fetched::modified("new".to_string(), Some("e2".into())))
            })
            .await
            .unwrap();
        assert_eq!(out.payload, "new");
        let entry = cache.get("k").unwrap();
        assert_eq!(entry.validator, "e2");
        assert_eq!(entry.payload, serde_json::json!("new"));
    }

    #[tokio::test]
    async fn payload_without_validator_is_not_cached() {
        let cache = ResponseCache::new();
        cache
            .fetch_or_validate("k", |_| async {
                Ok(Fetched::modified(1u8, Some("e1".into())))
            })
            .await
            .unwrap();
        cache
            .fetch_or_validate("k", |_| async { Ok(Fetched::modified(2u8, None)) })
            .await
            .unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unchanged_without_entry_is_error() {
        let cache = ResponseCache::new();
        let err = cache
            .fetch_or_validate::<u8, _, _>("k", |_| async { Ok(Fetched::Unchanged) })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Other(_)));
    }

    #[tokio::test]
    async fn supplier_error_leaves_entry() {
        let cache = ResponseCache::new();
        cache
            .fetch_or_validate("k", |_| async {
                Ok(Fetched::modified(1u8, Some("e1".into())))
            })
            .await
            .unwrap();
        let err = cache
            .fetch_or_validate::<u8, _, _>("k", |_| async {
                Err(SourceError::Timeout("slow".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout(_)));
        assert_eq!(cache.get("k").unwrap().validator, "e1");
    }

    #[tokio::test]
    async fn same_key_calls_are_serialized() {
        let cache = Arc::new(ResponseCache::new());
        let in_flight = Arc::new(AtomicU32::new(0));
        let mut set = tokio::task::JoinSet::new();
        for i in 0..4u32 {
            let cache = Arc::clone(&cache);
            let in_flight = Arc::clone(&in_flight);
            set.spawn(async move {
                cache
                    .fetch_or_validate("shared", |_| async move {
                        assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(Fetched::modified(i, Some(format!("e{i}"))))
                    })
                    .await
            });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn snapshot_and_restore() {
        let cache = ResponseCache::new();
        let entry = CacheEntry {
            key: "b".into(),
            validator: "v".into(),
            payload: serde_json::json!({"n": 1}),
            fetched_at: Utc::now(),
        };
        cache.restore(vec![entry.clone()]);
        assert_eq!(cache.snapshot(), vec![entry]);
        cache.clear();
        assert!(cache.snapshot().is_empty());
    }

    fn lock_count(cache: &ResponseCache) -> usize {
        cache.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn clear_and_restore_drop_idle_key_locks() {
        let cache = ResponseCache::new();
        for key in ["a", "b", "c"] {
            cache
                .fetch_or_validate(key, |_| async {
                    Ok(Fetched::modified(1u32, Some("e".into())))
                })
                .await
                .unwrap();
        }
        assert_eq!(lock_count(&cache), 3);
        cache.clear();
        assert_eq!(lock_count(&cache), 0);

        cache
            .fetch_or_validate("d", |_| async { Ok(Fetched::modified(1u32, None)) })
            .await
            .unwrap();
        let held = cache.key_lock("e");
        cache.restore(Vec::new());
        assert_eq!(lock_count(&cache), 1);
        drop(held);
        cache.restore(Vec::new());
        assert_eq!(lock_count(&cache), 0);
    }
}
