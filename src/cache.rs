use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Keyed TTL cache with stale-read support. Keys follow the
/// `<domain>:<entity>[:<qualifier>]` convention described in SPEC_FULL.md
/// section 4.2 (callers are responsible for building the key; the cache
/// itself is domain-agnostic).
pub struct TtlCache<V: Clone> {
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        TtlCache { entries: RwLock::new(HashMap::new()) }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.write().insert(
            key.into(),
            Entry { value, expires_at: Instant::now() + ttl },
        );
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.expires_at >= Instant::now() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Returns the cached value regardless of expiry, along with whether it
    /// has expired, so callers can serve a stale read when a live fetch
    /// fails (e.g. upstream rate limiting).
    pub fn get_with_expiry_status(&self, key: &str) -> Option<(V, bool)> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        let expired = entry.expires_at < Instant::now();
        Some((entry.value.clone(), expired))
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
