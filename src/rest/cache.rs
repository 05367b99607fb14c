//! In-memory cache of decoded GET responses.
//!
//! Entries are keyed by the full request URL (query string included) and
//! expire after a fixed time-to-live. A cache hit is served without touching
//! the network or the quota governors.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ldb_api_client::rest::ResponseCache;
//!
//! let cache = ResponseCache::new(Duration::from_secs(300));
//! cache.insert("https://bdl.stat.gov.pl/api/v1/version?lang=en", serde_json::json!({"version": "1.0"}));
//!
//! assert!(cache.get("https://bdl.stat.gov.pl/api/v1/version?lang=en").is_some());
//! assert!(cache.get("https://bdl.stat.gov.pl/api/v1/version?lang=pl").is_none());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

/// Size below which inserts never sweep expired entries.
const SWEEP_FLOOR: usize = 64;

/// A map whose entries expire a fixed duration after insertion.
///
/// Expired entries are swept when the map reaches `sweep_at`, which then
/// doubles past the surviving size, so sweeping costs O(1) per insert
/// amortized.
#[derive(Debug)]
struct TtlCache<K, V> {
    cache: HashMap<K, (V, Instant)>,
    ttl: Duration,
    sweep_at: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq,
{
    fn new(ttl: Duration) -> Self {
        Self {
            cache: HashMap::new(),
            ttl,
            sweep_at: SWEEP_FLOOR,
        }
    }

    fn insert(&mut self, key: K, value: V) {
        if self.cache.len() >= self.sweep_at {
            self.cleanup();
            self.sweep_at = (self.cache.len() * 2).max(SWEEP_FLOOR);
        }
        self.cache.insert(key, (value, Instant::now()));
    }

    fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key).and_then(|(value, inserted)| {
            if inserted.elapsed() < self.ttl {
                Some(value)
            } else {
                None
            }
        })
    }

    fn cleanup(&mut self) {
        let ttl = self.ttl;
        self.cache.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Thread-safe response cache shared by every clone of a client.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<TtlCache<String, Value>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(TtlCache::new(ttl)),
            ttl,
        }
    }

    /// Cached body for `url`, if present and fresh.
    pub fn get(&self, url: &str) -> Option<Value> {
        self.entries.lock().get(url).cloned()
    }

    /// Store the body fetched from `url`.
    ///
    /// Expired entries are dropped once the cache has grown enough, so the map
    /// stays within twice its live size.
    pub fn insert(&self, url: impl Into<String>, body: Value) {
        self.entries.lock().insert(url.into(), body);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Lifetime of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
