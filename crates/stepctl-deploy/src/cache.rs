//! Lookup caches for the lifecycle manager.
//!
//! Remote lookups that are repeated within a single workflow (name to ARN,
//! alias routing, version listings) are kept here. Entries may expire after
//! a TTL and are explicitly invalidated by the manager after its own writes,
//! so a long-lived manager does not keep serving routing it has changed.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// A keyed cache with optional time-to-live.
#[derive(Debug)]
pub struct Cache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }
}

impl<K: Eq + Hash, V: Clone> Cache<K, V> {
    /// Create a cache whose entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire `ttl` after insertion.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Get a live entry, if cached.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| !self.is_expired(e))
            .map(|e| e.value.clone())
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    /// Remove an entry.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|e| e.value)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The lock is not held while `fetch` runs. Errors are not cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns on failure.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    fn is_expired(&self, entry: &Entry<V>) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() >= ttl)
    }
}
