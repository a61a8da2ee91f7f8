//! Response cache for capability calls.
//!
//! Keys are derived from the capability name plus the serde_json
//! encoding of the arguments; `serde_json::Value` objects keep their
//! keys sorted, so structurally-equal arguments hash identically.
//! Entries expire by TTL and the cache is capacity-bounded, evicting
//! the least-recently-inserted entry when full.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Insertion order, oldest first.
    order: VecDeque<String>,
}

/// TTL + capacity bounded cache for successful capability results.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Deterministic key over (capability, normalized arguments).
    pub fn key(capability: &str, arguments: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(capability.as_bytes());
        hasher.update([0]);
        hasher.update(arguments.to_string().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Look up a live entry. Entries at or past expiry are never
    /// returned (and are removed on the way out).
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: serde_json::Value, ttl: Duration) {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        while inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            if let Some(oldest) = inner.order.pop_front() {
                debug!(key = %oldest, "evicting oldest cache entry");
                inner.entries.remove(&oldest);
            } else {
                break;
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_deterministic_and_argument_sensitive() {
        let a = ResponseCache::key("review", &json!({"file": "a.rs", "lang": "rust"}));
        let b = ResponseCache::key("review", &json!({"lang": "rust", "file": "a.rs"}));
        let c = ResponseCache::key("review", &json!({"file": "b.rs", "lang": "rust"}));
        // serde_json::Value sorts object keys, so a and b normalize equal.
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ResponseCache::key("docs", &json!({"file": "a.rs", "lang": "rust"})));
    }

    #[test]
    fn live_entry_is_returned() {
        let cache = ResponseCache::new(8);
        cache.put("k".into(), json!(1), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(json!(1)));
    }

    #[test]
    fn expired_entry_is_never_returned() {
        let cache = ResponseCache::new(8);
        cache.put("k".into(), json!(1), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_inserted() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), json!(1), Duration::from_secs(60));
        cache.put("b".into(), json!(2), Duration::from_secs(60));
        cache.put("c".into(), json!(3), Duration::from_secs(60));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.get("c"), Some(json!(3)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_refreshes_value_without_eviction() {
        let cache = ResponseCache::new(2);
        cache.put("a".into(), json!(1), Duration::from_secs(60));
        cache.put("b".into(), json!(2), Duration::from_secs(60));
        cache.put("a".into(), json!(10), Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some(json!(10)));
        assert_eq!(cache.get("b"), Some(json!(2)));
    }
}
