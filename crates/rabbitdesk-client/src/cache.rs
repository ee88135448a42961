//! Time-bounded, size-bounded response cache.
//!
//! Entries are keyed by [`CacheKey`], a canonical fingerprint of
//! `(target, resource, params)` that ignores parameter order. Each entry
//! carries its own expiry; expired entries are never returned and are purged
//! lazily on `get` or eagerly via [`ResponseCache::purge_expired`].
//!
//! ## Eviction
//!
//! When an insert would exceed `max_size`, the entry that was inserted
//! longest ago is evicted first (FIFO). Reads do not affect the order, so
//! this is *not* LRU. Re-setting an existing key counts as a fresh insertion.
//!
//! ## Epochs
//!
//! [`ResponseCache::clear`] starts a new epoch. A fetch that read the epoch
//! before dispatching stores its result with
//! [`ResponseCache::set_key_if_epoch`], which drops results fetched before
//! the last clear.
//!
//! ## Copy semantics
//!
//! `get` returns a clone of the stored value; mutating it never touches the
//! cached copy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::time::Instant;

use rabbitdesk_config::CacheConfig;

/// Empty parameter list for resources that take no parameters.
pub const NO_PARAMS: [(&str, &str); 0] = [];

/// Canonical fingerprint of a cacheable request.
///
/// Parameters are sorted by key, then value, before encoding, so two
/// parameter maps with the same pairs always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    target: String,
    resource: String,
    params: String,
}

impl CacheKey {
    /// Builds the key for `target`, `resource` and `params`.
    pub fn new<I, K, V>(target: &str, resource: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        pairs.sort();

        // JSON keeps separators inside keys and values unambiguous.
        let params = serde_json::to_string(&pairs).unwrap_or_default();

        Self {
            target: target.to_string(),
            resource: resource.to_string(),
            params,
        }
    }

    /// Target this key belongs to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resource type this key belongs to.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn matches(&self, target: &str, resource: Option<&str>) -> bool {
        self.target == target && resource.is_none_or(|r| self.resource == r)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.target, self.resource, self.params)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics. Computing them never purges anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Stored entries, expired ones included.
    pub size: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Entries still within their TTL.
    pub valid_entries: usize,
    /// Entries past their TTL but not yet purged.
    pub expired_entries: usize,
}

/// In-memory response cache with per-entry TTL and FIFO eviction.
pub struct ResponseCache<T> {
    entries: Mutex<IndexMap<CacheKey, CacheEntry<T>>>,
    epoch: AtomicU64,
    default_ttl: Duration,
    max_size: usize,
}

impl<T: Clone> ResponseCache<T> {
    /// Creates a cache. A `max_size` of zero is treated as one.
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            epoch: AtomicU64::new(0),
            default_ttl,
            max_size: max_size.max(1),
        }
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.default_ttl, config.max_size)
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<CacheKey, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores `value` under `(target, resource, params)`.
    ///
    /// The entry expires after `ttl`, or the default TTL when `None`.
    /// Evicts the oldest-inserted entries until there is room.
    pub fn set<I, K, V>(
        &self,
        target: &str,
        resource: &str,
        value: T,
        params: I,
        ttl: Option<Duration>,
    ) where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let key = CacheKey::new(target, resource, params);
        self.set_key(key, value, ttl);
    }

    /// Stores `value` under a prebuilt key.
    pub fn set_key(&self, key: CacheKey, value: T, ttl: Option<Duration>) {
        let mut entries = self.lock();
        self.insert_locked(&mut entries, key, value, ttl);
    }

    /// Stores `value` only if the cache has not been cleared since `epoch`
    /// was read. Returns whether the value was stored.
    pub fn set_key_if_epoch(
        &self,
        epoch: u64,
        key: CacheKey,
        value: T,
        ttl: Option<Duration>,
    ) -> bool {
        let mut entries = self.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(key = %key, "Dropping result fetched before cache clear");
            return false;
        }
        self.insert_locked(&mut entries, key, value, ttl);
        true
    }

    /// Current epoch; advances on every [`clear`](Self::clear).
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn insert_locked(
        &self,
        entries: &mut IndexMap<CacheKey, CacheEntry<T>>,
        key: CacheKey,
        value: T,
        ttl: Option<Duration>,
    ) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: now + ttl.unwrap_or(self.default_ttl),
        };

        entries.shift_remove(&key);
        while entries.len() >= self.max_size {
            if let Some((evicted, old)) = entries.shift_remove_index(0) {
                tracing::debug!(
                    key = %evicted,
                    age_ms = now.duration_since(old.inserted_at).as_millis() as u64,
                    "Evicted oldest cache entry"
                );
            } else {
                break;
            }
        }
        entries.insert(key, entry);
    }

    /// Returns a copy of the value stored under `(target, resource, params)`
    /// if it has not expired.
    pub fn get<I, K, V>(&self, target: &str, resource: &str, params: I) -> Option<T>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.get_key(&CacheKey::new(target, resource, params))
    }

    /// Returns a copy of the value stored under `key` if it has not expired.
    pub fn get_key(&self, key: &CacheKey) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                tracing::trace!(key = %key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.shift_remove(key);
                tracing::trace!(key = %key, "Cache entry expired");
                None
            }
            None => {
                tracing::trace!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Removes entries for `target`, limited to `resource` when given.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate(&self, target: &str, resource: Option<&str>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.matches(target, resource));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(target_id = target, resource, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Removes every entry and starts a new epoch.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        drop(entries);
        tracing::debug!("Cleared response cache");
    }

    /// Removes expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Returns size and validity counts without purging.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.lock();
        let valid_entries = entries.values().filter(|e| e.is_live(now)).count();
        CacheStats {
            size: entries.len(),
            max_size: self.max_size,
            valid_entries,
            expired_entries: entries.len() - valid_entries,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Default TTL applied by `set` without override.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<T> fmt::Debug for ResponseCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.entries.lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("ResponseCache")
            .field("size", &size)
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
