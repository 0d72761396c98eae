//! Expiring cache layer for report generation.
//!
//! - [`CacheStore`]: process-local, size-bounded key/value store with
//!   per-entry TTL and least-recently-used eviction.
//! - [`CacheKey`]: deterministic key construction from a prefix and
//!   name-sorted parameters, hashed when long.
//! - [`WildcardPattern`]: `*` patterns used for bulk invalidation.
//! - [`TieredCache`]: a local store with an optional shared
//!   [`RemoteCache`] tier beneath it (write-through).
//! - [`CacheManager`]: the three independently sized stores used by the
//!   pipeline (datasets, charts, query results).

pub mod error;
pub mod key;
pub mod manager;
pub mod pattern;
pub mod store;
pub mod tiered;

pub use error::CacheError;
pub use key::{chart_key, CacheKey};
pub use manager::{CacheManager, CacheManagerConfig, CacheManagerStats};
pub use pattern::WildcardPattern;
pub use store::{CacheConfig, CacheEntryInfo, CacheStats, CacheStore, CacheValue};
pub use tiered::{RemoteCache, RemoteEntry, TieredCache};
