//! Process-local LRU + TTL store.
//!
//! [`CacheStore`] holds opaque JSON payloads behind `Arc` so that a hit
//! hands out a shared, immutable view of the stored value. Expiry is checked
//! lazily on every read and can additionally be swept with
//! [`CacheStore::cleanup_expired`]; eviction when the store is full is
//! purely recency based and ignores entry size and TTL.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use vigil_core::types::Timestamp;

use crate::error::CacheError;
use crate::pattern::WildcardPattern;

/// Shared, immutable cached payload.
pub type CacheValue = Arc<serde_json::Value>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    pub max_entries: usize,
    /// TTL applied when `set` is called without one. `None` never expires.
    pub default_ttl: Option<Duration>,
}

impl CacheConfig {
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            max_entries,
            default_ttl,
        }
    }
}

// ---------------------------------------------------------------------------
// Entries and diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheEntry {
    value: CacheValue,
    created_at: Timestamp,
    created: Instant,
    expires: Option<Instant>,
    last_accessed: Instant,
    access_count: u64,
    size_bytes: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires.is_some_and(|at| now >= at)
    }

    /// Wall-clock time corresponding to a monotonic instant of this entry.
    fn wall_time(&self, instant: Instant) -> Timestamp {
        let offset = instant.saturating_duration_since(self.created);
        self.created_at + chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Read-only view of one entry, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub last_accessed: Timestamp,
    pub access_count: u64,
    pub size_bytes: usize,
}

/// Counters for one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Sum of approximate serialized sizes. Diagnostic only.
    pub total_bytes: usize,
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Thread-safe, size-bounded, time-expiring store.
///
/// Every operation, reads included, takes the single store lock: a hit
/// moves the entry to the most-recently-used position and bumps its
/// counters, so reading is a mutation.
#[derive(Debug)]
pub struct CacheStore {
    name: String,
    default_ttl: Option<Duration>,
    inner: Mutex<Inner>,
}

impl CacheStore {
    /// Create a store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if `max_entries` is zero.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Result<Self, CacheError> {
        let name = name.into();
        let capacity = NonZeroUsize::new(config.max_entries).ok_or_else(|| {
            CacheError::Config(format!("cache '{name}' must hold at least one entry"))
        })?;

        Ok(Self {
            name,
            default_ttl: config.default_ttl,
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..Default::default()
                },
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Look up `key`.
    ///
    /// An expired entry is removed and reported as a miss. A live entry is
    /// promoted to most-recently-used and its access counters updated.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            tracing::trace!(cache = %self.name, key, "Expired entry removed on read");
            return None;
        }

        let entry = inner.entries.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        inner.stats.hits += 1;
        Some(Arc::clone(&entry.value))
    }

    /// Store `value` under `key`, replacing any existing entry.
    ///
    /// `ttl` overrides the store default. When the store is full the
    /// least-recently-used entry is evicted first. Returns the shared
    /// handle to the stored value.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheValue {
        self.insert(key.into(), Arc::new(value), ttl)
    }

    /// Like [`set`](Self::set) for a value that is already shared.
    pub fn insert(&self, key: String, value: CacheValue, ttl: Option<Duration>) -> CacheValue {
        // Sizing happens outside the lock; it is only used for diagnostics.
        let size_bytes = serde_json::to_vec(value.as_ref())
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        let now = Instant::now();
        let ttl = ttl.or(self.default_ttl);

        let entry = CacheEntry {
            value: Arc::clone(&value),
            created_at: Utc::now(),
            created: now,
            expires: ttl.map(|ttl| now + ttl),
            last_accessed: now,
            access_count: 0,
            size_bytes,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        // Replace rather than merge: drop the previous entry so the push
        // below never reports it as an eviction.
        inner.entries.pop(key.as_str());
        if let Some((evicted_key, _)) = inner.entries.push(key, entry) {
            inner.stats.evictions += 1;
            tracing::debug!(cache = %self.name, key = %evicted_key, "Evicted least recently used entry");
        }

        value
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Remove every entry that is expired now and return how many were
    /// removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key.as_str());
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Remove every key matching `pattern` and return how many were
    /// removed.
    pub fn invalidate_pattern(&self, pattern: &WildcardPattern) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let matching: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            inner.entries.pop(key.as_str());
        }
        if !matching.is_empty() {
            tracing::debug!(
                cache = %self.name,
                pattern = %pattern,
                removed = matching.len(),
                "Invalidated cache entries by pattern"
            );
        }
        matching.len()
    }

    /// Inspect an entry without touching its recency or counters.
    pub fn entry_info(&self, key: &str) -> Option<CacheEntryInfo> {
        let guard = self.inner.lock();
        let entry = guard.entries.peek(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(CacheEntryInfo {
            key: key.to_string(),
            created_at: entry.created_at,
            expires_at: entry.expires.map(|at| entry.wall_time(at)),
            last_accessed: entry.wall_time(entry.last_accessed),
            access_count: entry.access_count,
            size_bytes: entry.size_bytes,
        })
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        CacheStats {
            entries: guard.entries.len(),
            total_bytes: guard.entries.iter().map(|(_, e)| e.size_bytes).sum(),
            ..guard.stats
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
