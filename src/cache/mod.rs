//! Path Cache (4.A): durable mapping of canonical video path to
//! `{server_id, descriptor_hash}`, shared by the Apply Pipeline, the Event
//! Intake retry engine, and the repair sweep.

use crate::error::CacheLoadError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One cache row. Either field may be absent on disk.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(
        default,
        rename = "nfo_hash",
        skip_serializing_if = "Option::is_none"
    )]
    pub descriptor_hash: Option<String>,
}

impl CacheEntry {
    /// An entry with neither field set — indistinguishable from a miss
    /// except by identity, which callers don't need: a miss and a
    /// zero-valued entry are handled the same way downstream.
    pub fn is_empty(&self) -> bool {
        self.server_id.is_none() && self.descriptor_hash.is_none()
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

/// Thread-safe, lazily-persisted video-path → cache-entry map.
pub struct Cache {
    path: PathBuf,
    inner: Mutex<Inner>,
    persist_lock: Mutex<()>,
}

impl Cache {
    /// Load the cache from `path`, or start empty if it does not exist yet.
    pub fn load(path: &Path) -> Result<Self, CacheLoadError> {
        let entries = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|source| CacheLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            serde_json::from_str(&content).map_err(|source| CacheLoadError::Malformed {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                entries,
                dirty: false,
            }),
            persist_lock: Mutex::new(()),
        })
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Zero-valued entry on miss, distinguishable from a present
    /// empty-id entry only by the caller not needing to tell them apart.
    pub fn get(&self, path: &Path) -> CacheEntry {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.get(&Self::key(path)).cloned().unwrap_or_default()
    }

    /// Merge non-empty fields into the entry for `path`.
    pub fn update(&self, path: &Path, server_id: Option<String>, descriptor_hash: Option<String>) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let key = Self::key(path);
        let entry = inner.entries.entry(key).or_default();
        if let Some(id) = server_id {
            entry.server_id = Some(id);
        }
        if let Some(hash) = descriptor_hash {
            entry.descriptor_hash = Some(hash);
        }
        inner.dirty = true;
    }

    /// Delete the key for `path`. Idempotent.
    pub fn remove(&self, path: &Path) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if inner.entries.remove(&Self::key(path)).is_some() {
            inner.dirty = true;
        }
    }

    /// Snapshot of paths whose entry has no usable `server_id` yet — either
    /// absent, or the empty-string placeholder a one-shot resolution miss
    /// records (§4.D step 6c).
    pub fn entries_missing_server_id(&self) -> Vec<PathBuf> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.server_id.as_deref().map_or(true, str::is_empty))
            .map(|(key, _)| PathBuf::from(key))
            .collect()
    }

    /// Read-only snapshot of the whole map, for iteration without holding
    /// the mutating lock.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.len()
    }

    pub fn is_empty_cache(&self) -> bool {
        self.len() == 0
    }

    /// Write the whole map to the backing file if dirty, via
    /// write-to-temp-then-rename. Logs entry count on success; on write
    /// failure, logs and leaves the dirty flag set so the next tick retries.
    pub fn flush(&self) {
        let snapshot = {
            let mut inner = self.inner.lock().expect("cache mutex poisoned");
            if !inner.dirty {
                return;
            }
            inner.dirty = false;
            inner.entries.clone()
        };

        let _persist_guard = self.persist_lock.lock().expect("persist mutex poisoned");

        match self.write_atomic(&snapshot) {
            Ok(()) => {
                tracing::info!(entries = snapshot.len(), path = %self.path.display(), "cache flushed");
            }
            Err(err) => {
                tracing::error!(error = %err, path = %self.path.display(), "cache flush failed, will retry");
                let mut inner = self.inner.lock().expect("cache mutex poisoned");
                inner.dirty = true;
            }
        }
    }

    fn write_atomic(&self, entries: &HashMap<String, CacheEntry>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(entries)
            .expect("cache entries are always JSON-serializable");

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn miss_returns_zero_valued_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let entry = cache.get(&PathBuf::from("/media/a.mkv"));
        assert!(entry.is_empty());
    }

    #[test]
    fn update_merges_non_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let path = PathBuf::from("/media/a.mkv");

        cache.update(&path, Some("42".to_string()), None);
        assert_eq!(cache.get(&path).server_id, Some("42".to_string()));
        assert_eq!(cache.get(&path).descriptor_hash, None);

        cache.update(&path, None, Some("abcd".to_string()));
        assert_eq!(cache.get(&path).server_id, Some("42".to_string()));
        assert_eq!(cache.get(&path).descriptor_hash, Some("abcd".to_string()));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();
        let path = PathBuf::from("/media/a.mkv");

        cache.update(&path, Some("42".to_string()), None);
        cache.remove(&path);
        cache.remove(&path);
        assert!(cache.get(&path).is_empty());
    }

    #[test]
    fn entries_missing_server_id_excludes_resolved_paths() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();

        cache.update(&PathBuf::from("/a.mkv"), Some("1".to_string()), None);
        cache.update(&PathBuf::from("/b.mkv"), None, Some("hash".to_string()));

        let missing = cache.entries_missing_server_id();
        assert_eq!(missing, vec![PathBuf::from("/b.mkv")]);
    }

    #[test]
    fn entries_missing_server_id_includes_empty_string_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::load(&dir.path().join("cache.json")).unwrap();

        // The one-shot resolution-miss placeholder (§4.D step 6c) records
        // `server_id = Some("")`, not `None` — it must still count as
        // missing so the repair sweep can find it.
        cache.update(&PathBuf::from("/a.mkv"), Some(String::new()), None);
        cache.update(&PathBuf::from("/b.mkv"), Some("1".to_string()), None);

        let missing = cache.entries_missing_server_id();
        assert_eq!(missing, vec![PathBuf::from("/a.mkv")]);
    }

    #[test]
    fn flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        let cache = Cache::load(&cache_path).unwrap();
        let path = PathBuf::from("/media/a.mkv");

        cache.update(&path, Some("42".to_string()), Some("deadbeef".to_string()));
        cache.flush();
        assert!(cache_path.exists());

        let reloaded = Cache::load(&cache_path).unwrap();
        let entry = reloaded.get(&path);
        assert_eq!(entry.server_id, Some("42".to_string()));
        assert_eq!(entry.descriptor_hash, Some("deadbeef".to_string()));
    }

    #[test]
    fn flush_is_a_no_op_when_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        let cache = Cache::load(&cache_path).unwrap();
        cache.flush();
        assert!(!cache_path.exists());
    }

    #[test]
    fn malformed_cache_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        std::fs::write(&cache_path, "not json").unwrap();
        assert!(matches!(
            Cache::load(&cache_path),
            Err(CacheLoadError::Malformed { .. })
        ));
    }
}
