//! Periodic sweep of expired cache entries.
//!
//! Lookups already drop expired entries lazily; this job reclaims the ones
//! nobody asks for again. When the shared PostgreSQL tier is enabled its
//! expired rows are purged on the same schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vigil_cache::CacheManager;
use vigil_db::PgCacheTier;

/// Run the cache cleanup loop until `cancel` is triggered.
pub async fn run(
    cache: Arc<CacheManager>,
    remote: Option<Arc<PgCacheTier>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        remote_tier = remote.is_some(),
        "Cache cleanup job started"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; nothing has expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cache cleanup job stopping");
                break;
            }
            _ = ticker.tick() => {
                sweep(&cache, remote.as_deref()).await;
            }
        }
    }
}

/// One sweep over every store. Returns the number of local entries removed.
pub async fn sweep(cache: &CacheManager, remote: Option<&PgCacheTier>) -> usize {
    let removed = cache.cleanup_expired();
    if removed > 0 {
        let stats = cache.stats();
        tracing::info!(
            removed,
            reports = stats.reports.entries,
            charts = stats.charts.entries,
            queries = stats.queries.entries,
            "Cache cleanup: expired entries removed"
        );
    } else {
        tracing::debug!("Cache cleanup: nothing expired");
    }

    if let Some(remote) = remote {
        match remote.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Cache cleanup: purged expired shared entries"),
            Err(e) => tracing::error!(error = %e, "Cache cleanup: shared tier purge failed"),
        }
    }

    removed
}
