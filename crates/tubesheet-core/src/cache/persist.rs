//! Persist the response cache to disk (JSON under XDG state dir) so
//! validators survive across CLI runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{CacheEntry, ResponseCache};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    entries: Vec<CacheEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

impl ResponseCache {
    /// Default path for the cache file: `~/.local/state/tubesheet/response_cache.json`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::config::state_dir()?.join("response_cache.json"))
    }

    /// Save all entries to the given path (creates parent dir if needed).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let snapshot = PersistedCache {
            version: SNAPSHOT_VERSION,
            entries: self.snapshot(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string(&snapshot).context("serialize response cache")?;
        std::fs::write(path, json)
            .with_context(|| format!("write response cache: {}", path.display()))?;
        Ok(())
    }

    /// Load a cache from the given path. A missing file yields `None`; a file
    /// written by a different snapshot version is ignored with a warning.
    pub fn load_from_path(path: &Path) -> Result<Option<ResponseCache>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read response cache: {}", path.display()));
            }
        };
        let snapshot: PersistedCache = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse response cache: {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                "ignoring response cache with unknown snapshot version"
            );
            return Ok(None);
        }
        let cache = ResponseCache::new();
        cache.restore(snapshot.entries);
        Ok(Some(cache))
    }
}
