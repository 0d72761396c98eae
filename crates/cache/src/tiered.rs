//! Local store with an optional shared remote tier.
//!
//! Reads try the local [`CacheStore`] first and fall back to the remote
//! tier, back-filling the local store on a remote hit. Writes go to both
//! tiers (write-through). The remote tier is best effort: its errors are
//! logged and treated as misses, never surfaced to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use vigil_core::types::Timestamp;

use crate::error::CacheError;
use crate::pattern::WildcardPattern;
use crate::store::{CacheStats, CacheStore, CacheValue};

/// A live value read from the remote tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub value: serde_json::Value,
    /// `None` never expires.
    pub expires_at: Option<Timestamp>,
}

impl RemoteEntry {
    pub fn new(value: serde_json::Value, expires_at: Option<Timestamp>) -> Self {
        Self { value, expires_at }
    }

    /// Lifetime left at `now`. Zero once `expires_at` has passed.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        self.expires_at
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// A cache shared between processes (e.g. a database table).
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Return the live entry for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<RemoteEntry>, CacheError>;

    /// Store `value`, replacing any previous value. `None` never expires.
    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key matching `pattern`, returning how many were removed.
    async fn invalidate_pattern(&self, pattern: &WildcardPattern) -> Result<u64, CacheError>;
}

pub struct TieredCache {
    local: CacheStore,
    remote: Option<Arc<dyn RemoteCache>>,
}

impl fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.local.name())
            .field("has_remote", &self.has_remote())
            .finish()
    }
}

impl TieredCache {
    pub fn local_only(local: CacheStore) -> Self {
        Self {
            local,
            remote: None,
        }
    }

    pub fn with_remote(local: CacheStore, remote: Arc<dyn RemoteCache>) -> Self {
        Self {
            local,
            remote: Some(remote),
        }
    }

    pub fn local(&self) -> &CacheStore {
        &self.local
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        if let Some(value) = self.local.get(key) {
            return Some(value);
        }

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(Some(entry)) => {
                // The local copy must not outlive the remote row.
                let ttl = entry.remaining(Utc::now());
                if ttl.is_some_and(|left| left.is_zero()) {
                    tracing::debug!(cache = %self.local.name(), key, "Remote entry expired on read");
                    return None;
                }
                tracing::debug!(cache = %self.local.name(), key, "Remote tier hit, back-filling local store");
                Some(self.local.set(key, entry.value, ttl))
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache = %self.local.name(), key, error = %e, "Remote cache read failed");
                None
            }
        }
    }

    pub async fn set(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CacheValue {
        let key = key.into();
        let stored = self.local.set(key.clone(), value, ttl);

        if let Some(remote) = &self.remote {
            let ttl = ttl.or(self.local.default_ttl());
            if let Err(e) = remote.set(&key, &stored, ttl).await {
                tracing::warn!(cache = %self.local.name(), key = %key, error = %e, "Remote cache write failed");
            }
        }

        stored
    }

    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.local.delete(key);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(key).await {
                tracing::warn!(cache = %self.local.name(), key, error = %e, "Remote cache delete failed");
            }
        }
        removed
    }

    /// Invalidate in both tiers. Returns the number of local entries removed.
    pub async fn invalidate_pattern(&self, pattern: &WildcardPattern) -> usize {
        let removed = self.local.invalidate_pattern(pattern);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.invalidate_pattern(pattern).await {
                tracing::warn!(
                    cache = %self.local.name(),
                    pattern = %pattern,
                    error = %e,
                    "Remote cache invalidation failed"
                );
            }
        }
        removed
    }

    /// Sweep the local tier. The remote tier expires entries on its own.
    pub fn cleanup_expired(&self) -> usize {
        self.local.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.local.stats()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
