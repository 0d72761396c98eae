//! The stores used by report generation, sized independently.
//!
//! | Store     | Holds                         | Default size | Default TTL |
//! |-----------|-------------------------------|--------------|-------------|
//! | `reports` | compiled datasets             | 256          | 1 h         |
//! | `charts`  | chart payloads                | 1024         | 30 min      |
//! | `queries` | summary and lookup results    | 2048         | 5 min       |
//!
//! `reports` and `charts` may share a remote tier; `queries` is always
//! process-local.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use vigil_core::types::DbId;

use crate::error::CacheError;
use crate::key::{PREFIX_CHART, PREFIX_REPORT, PREFIX_SUMMARY};
use crate::pattern::WildcardPattern;
use crate::store::{CacheConfig, CacheStats, CacheStore};
use crate::tiered::{RemoteCache, TieredCache};

pub const DEFAULT_REPORT_ENTRIES: usize = 256;
pub const DEFAULT_REPORT_TTL_SECS: u64 = 3600;
pub const DEFAULT_CHART_ENTRIES: usize = 1024;
pub const DEFAULT_CHART_TTL_SECS: u64 = 1800;
pub const DEFAULT_QUERY_ENTRIES: usize = 2048;
pub const DEFAULT_QUERY_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheManagerConfig {
    pub reports: CacheConfig,
    pub charts: CacheConfig,
    pub queries: CacheConfig,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            reports: CacheConfig::new(
                DEFAULT_REPORT_ENTRIES,
                Some(Duration::from_secs(DEFAULT_REPORT_TTL_SECS)),
            ),
            charts: CacheConfig::new(
                DEFAULT_CHART_ENTRIES,
                Some(Duration::from_secs(DEFAULT_CHART_TTL_SECS)),
            ),
            queries: CacheConfig::new(
                DEFAULT_QUERY_ENTRIES,
                Some(Duration::from_secs(DEFAULT_QUERY_TTL_SECS)),
            ),
        }
    }
}

/// Per-store statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheManagerStats {
    pub reports: CacheStats,
    pub charts: CacheStats,
    pub queries: CacheStats,
}

#[derive(Debug)]
pub struct CacheManager {
    reports: TieredCache,
    charts: TieredCache,
    queries: CacheStore,
}

impl CacheManager {
    /// Build the three stores. `remote`, when given, backs `reports` and
    /// `charts`.
    pub fn new(
        config: CacheManagerConfig,
        remote: Option<Arc<dyn RemoteCache>>,
    ) -> Result<Self, CacheError> {
        let reports = CacheStore::new("reports", config.reports)?;
        let charts = CacheStore::new("charts", config.charts)?;
        let queries = CacheStore::new("queries", config.queries)?;

        let (reports, charts) = match remote {
            Some(remote) => (
                TieredCache::with_remote(reports, Arc::clone(&remote)),
                TieredCache::with_remote(charts, remote),
            ),
            None => (
                TieredCache::local_only(reports),
                TieredCache::local_only(charts),
            ),
        };

        Ok(Self {
            reports,
            charts,
            queries,
        })
    }

    pub fn reports(&self) -> &TieredCache {
        &self.reports
    }

    pub fn charts(&self) -> &TieredCache {
        &self.charts
    }

    pub fn queries(&self) -> &CacheStore {
        &self.queries
    }

    /// Drop every cached artifact derived from one report: its datasets,
    /// its chart payloads and its summary results. Returns the number of
    /// local entries removed.
    pub async fn invalidate_report(&self, report_id: DbId) -> usize {
        let mut removed = 0;

        for pattern in [
            format!("{PREFIX_REPORT}_{report_id}"),
            format!("{PREFIX_REPORT}_{report_id}_*"),
        ] {
            removed += self
                .reports
                .invalidate_pattern(&WildcardPattern::parse(pattern))
                .await;
        }

        removed += self
            .charts
            .invalidate_pattern(&WildcardPattern::parse(format!(
                "{PREFIX_CHART}_*_{report_id}"
            )))
            .await;

        for pattern in [
            format!("{PREFIX_SUMMARY}_{report_id}"),
            format!("{PREFIX_SUMMARY}_{report_id}_*"),
        ] {
            removed += self
                .queries
                .invalidate_pattern(&WildcardPattern::parse(pattern));
        }

        tracing::debug!(report_id, removed, "Invalidated cached report artifacts");
        removed
    }

    /// Drop summary query results for one report only.
    pub fn invalidate_summary(&self, report_id: DbId) -> usize {
        [
            format!("{PREFIX_SUMMARY}_{report_id}"),
            format!("{PREFIX_SUMMARY}_{report_id}_*"),
        ]
        .into_iter()
        .map(|p| self.queries.invalidate_pattern(&WildcardPattern::parse(p)))
        .sum()
    }

    /// Sweep expired entries from every local store.
    pub fn cleanup_expired(&self) -> usize {
        self.reports.cleanup_expired() + self.charts.cleanup_expired() + self.queries.cleanup_expired()
    }

    pub fn stats(&self) -> CacheManagerStats {
        CacheManagerStats {
            reports: self.reports.stats(),
            charts: self.charts.stats(),
            queries: self.queries.stats(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{chart_key, CacheKey};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn manager() -> CacheManager {
        CacheManager::new(CacheManagerConfig::default(), None).unwrap()
    }

    #[test]
    fn zero_sized_store_is_rejected() {
        let config = CacheManagerConfig {
            charts: CacheConfig::new(0, None),
            ..CacheManagerConfig::default()
        };
        assert_matches!(CacheManager::new(config, None), Err(CacheError::Config(_)));
    }

    #[test]
    fn debug_lists_each_store() {
        let shown = format!("{:?}", manager());
        assert!(shown.contains("\"reports\""));
        assert!(shown.contains("\"charts\""));
        assert!(shown.contains("has_remote: false"));
    }

    #[tokio::test]
    async fn invalidate_report_only_touches_that_report() {
        let cache = manager();
        let key_5 = CacheKey::scoped(PREFIX_REPORT, 5).param("d", "standard").build();
        let key_55 = CacheKey::scoped(PREFIX_REPORT, 55).param("d", "standard").build();

        cache.reports().set(key_5.clone(), json!({}), None).await;
        cache.reports().set(key_55.clone(), json!({}), None).await;
        cache.charts().set(chart_key("asset_risk", 5), json!({}), None).await;
        cache.charts().set(chart_key("asset_risk", 15), json!({}), None).await;
        cache.queries().set("summary_5", json!({}), None);
        cache.queries().set("summary_55", json!({}), None);

        let removed = cache.invalidate_report(5).await;

        assert_eq!(removed, 3);
        assert!(cache.reports().get(&key_5).await.is_none());
        assert!(cache.reports().get(&key_55).await.is_some());
        assert!(cache.charts().get(&chart_key("asset_risk", 5)).await.is_none());
        assert!(cache.charts().get(&chart_key("asset_risk", 15)).await.is_some());
        assert!(cache.queries().get("summary_5").is_none());
        assert!(cache.queries().get("summary_55").is_some());
    }

    #[test]
    fn invalidate_summary_leaves_other_stores() {
        let cache = manager();
        cache.queries().set("summary_3", json!(1), None);
        assert_eq!(cache.invalidate_summary(3), 1);
        assert_eq!(cache.invalidate_summary(3), 0);
    }

    #[tokio::test]
    async fn cleanup_sums_all_stores() {
        let cache = manager();
        let ttl = Some(Duration::from_millis(5));
        cache.reports().set("report_1_a", json!(1), ttl).await;
        cache.charts().set("chart_x_1", json!(1), ttl).await;
        cache.queries().set("summary_1", json!(1), ttl);
        cache.queries().set("summary_2", json!(1), None);

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.cleanup_expired(), 3);
        assert_eq!(cache.stats().queries.entries, 1);
    }
}
