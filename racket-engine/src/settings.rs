//! TTL-cached settings service.
//!
//! Admin-tunable overrides live in the store's settings table. Reads go
//! through a cache with a TTL and writes invalidate the cached key, so a
//! changed value is visible immediately to the writer's process and within
//! one TTL everywhere else. This replaces any process-global settings
//! state: the service is constructed once and injected into its callers.

use crate::error::EngineResult;
use racket_store::Store;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

/// A read-through cache whose entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given entry lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Fetch a live entry; expired entries read as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap();
        let (stored_at, value) = entries.get(key)?;
        if stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(value.clone())
    }

    /// Store a value, resetting its TTL.
    ///
    /// Expired entries are pruned here, so the map stays bounded by the
    /// working set instead of growing with every key ever read.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }

    /// Drop one entry immediately.
    pub fn invalidate(&self, key: &K) {
        self.entries.write().unwrap().remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

/// Store-backed settings with a TTL cache in front.
pub struct SettingsService<S> {
    store: Arc<S>,
    cache: TtlCache<String, Option<String>>,
}

impl<S: Store> SettingsService<S> {
    /// Create a settings service reading through the given store.
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, cache: TtlCache::new(ttl) }
    }

    /// Read a setting, serving from cache within the TTL.
    ///
    /// Missing keys are cached too, so hot lookups of unset keys do not
    /// hit the store on every call.
    pub async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        if let Some(cached) = self.cache.get(&key.to_string()) {
            return Ok(cached);
        }
        let value = self.store.settings().get(key).await?;
        self.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Read a setting parsed as an integer; unparsable values read as
    /// absent (and are logged) rather than failing the caller.
    pub async fn get_i64(&self, key: &str) -> EngineResult<Option<i64>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match raw.parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                warn!(key, raw, "ignoring unparsable settings override");
                Ok(None)
            },
        }
    }

    /// Write a setting and invalidate its cached value.
    pub async fn set(&self, key: &str, value: &str) -> EngineResult<()> {
        self.store.settings().set(key, value).await?;
        self.cache.invalidate(&key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racket_store::MemoryStore;

    #[test]
    fn test_ttl_cache_expires_entries() {
        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_millis(0));
        cache.insert("k".to_string(), 1);
        // Zero TTL: everything is already expired.
        assert_eq!(cache.get(&"k".to_string()), None);

        let cache: TtlCache<String, i64> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        cache.invalidate(&"k".to_string());
        assert_eq!(cache.get(&"k".to_string()), None);
    }

    #[tokio::test]
    async fn test_settings_read_through_and_invalidate() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsService::new(store.clone(), Duration::from_secs(60));

        assert_eq!(settings.get("heist.join_window_secs").await.unwrap(), None);

        // A write through the service is visible immediately.
        settings.set("heist.join_window_secs", "45").await.unwrap();
        assert_eq!(settings.get_i64("heist.join_window_secs").await.unwrap(), Some(45));

        // A stale cache entry hides direct store writes until invalidated.
        use racket_store::SettingsRepository;
        SettingsRepository::set(store.as_ref(), "heist.join_window_secs", "90")
            .await
            .unwrap();
        assert_eq!(settings.get_i64("heist.join_window_secs").await.unwrap(), Some(45));
        settings.set("heist.join_window_secs", "90").await.unwrap();
        assert_eq!(settings.get_i64("heist.join_window_secs").await.unwrap(), Some(90));
    }

    #[tokio::test]
    async fn test_settings_bad_override_reads_as_absent() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsService::new(store, Duration::from_secs(60));
        settings.set("heist.join_window_secs", "soon").await.unwrap();
        assert_eq!(settings.get_i64("heist.join_window_secs").await.unwrap(), None);
    }
}
