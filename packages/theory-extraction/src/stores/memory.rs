//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::error::Result;
use crate::traits::store::{AnalysisCache, ArtifactKey, ArtifactStore, CacheKey, StoredArtifact};

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory cache and artifact store.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    artifacts: RwLock<HashMap<ArtifactKey, Vec<StoredArtifact>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        write(&self.cache).clear();
        write(&self.artifacts).clear();
    }

    /// Get the number of live cache entries.
    pub fn cache_len(&self) -> usize {
        let now = Instant::now();
        read(&self.cache).values().filter(|e| e.is_live(now)).count()
    }

    /// Get the number of distinct artifact keys.
    pub fn artifact_count(&self) -> usize {
        read(&self.artifacts).len()
    }

    /// Drop expired cache entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut cache = write(&self.cache);
        let before = cache.len();
        cache.retain(|_, e| e.is_live(now));
        before - cache.len()
    }
}

#[async_trait]
impl AnalysisCache for MemoryStore {
    async fn get_cached(&self, key: &CacheKey) -> Result<Option<serde_json::Value>> {
        let now = Instant::now();
        Ok(read(&self.cache)
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put_if_absent(
        &self,
        key: &CacheKey,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut cache = write(&self.cache);
        if cache.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        cache.insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(true)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put_artifact(&self, key: &ArtifactKey, value: serde_json::Value) -> Result<u32> {
        let mut artifacts = write(&self.artifacts);
        let history = artifacts.entry(key.clone()).or_default();

        if let Some(latest) = history.last() {
            if latest.value == value {
                return Ok(latest.revision);
            }
        }

        let revision = history.last().map_or(1, |a| a.revision + 1);
        history.push(StoredArtifact {
            key: key.clone(),
            revision,
            stored_at: Utc::now(),
            value,
        });
        Ok(revision)
    }

    async fn latest_artifact(&self, key: &ArtifactKey) -> Result<Option<StoredArtifact>> {
        Ok(read(&self.artifacts)
            .get(key)
            .and_then(|h| h.last())
            .cloned())
    }

    async fn artifact_history(&self, key: &ArtifactKey) -> Result<Vec<StoredArtifact>> {
        Ok(read(&self.artifacts).get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::store::ArtifactKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_cache_is_write_once() {
        let store = MemoryStore::new();
        let key = CacheKey::new("phase1_vocabulary_extraction", "abc");
        let ttl = Duration::from_secs(60);

        assert!(store.put_if_absent(&key, json!(1), ttl).await.unwrap());
        assert!(!store.put_if_absent(&key, json!(2), ttl).await.unwrap());
        assert_eq!(store.get_cached(&key).await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible_and_replaceable() {
        let store = MemoryStore::new();
        let key = CacheKey::new("detect_sequence", "abc");

        store.put_if_absent(&key, json!("old"), Duration::ZERO).await.unwrap();
        assert_eq!(store.get_cached(&key).await.unwrap(), None);

        assert!(store
            .put_if_absent(&key, json!("new"), Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get_cached(&key).await.unwrap(), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_artifact_revisions_increase_only_on_change() {
        let store = MemoryStore::new();
        let key = ArtifactKey::segment("doc", "doc#0", ArtifactKind::Routing);

        assert_eq!(store.put_artifact(&key, json!({"mode": "single"})).await.unwrap(), 1);
        assert_eq!(store.put_artifact(&key, json!({"mode": "single"})).await.unwrap(), 1);
        assert_eq!(store.put_artifact(&key, json!({"mode": "hybrid"})).await.unwrap(), 2);

        let history = store.artifact_history(&key).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].value, json!({"mode": "single"}));
        assert_eq!(
            store.latest_artifact(&key).await.unwrap().unwrap().revision,
            2
        );
    }
}
