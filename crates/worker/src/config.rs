use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vigil_cache::manager::{
    DEFAULT_CHART_ENTRIES, DEFAULT_CHART_TTL_SECS, DEFAULT_QUERY_ENTRIES, DEFAULT_QUERY_TTL_SECS,
    DEFAULT_REPORT_ENTRIES, DEFAULT_REPORT_TTL_SECS,
};
use vigil_cache::{CacheConfig, CacheManagerConfig};
use vigil_pipeline::config::{DEFAULT_BASE_URL, DEFAULT_COLLABORATOR_TIMEOUT_SECS};
use vigil_pipeline::PipelineConfig;

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CACHE_CLEANUP_INTERVAL_SECS: u64 = 300;
const DEFAULT_DISPATCH_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_MAX_CONCURRENT_REPORTS: usize = 4;
const DEFAULT_EXPORT_DIR: &str = "./exports";
const DEFAULT_INVENTORY_SNAPSHOT: &str = "./inventory.json";

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. Values that
/// fail to parse, and zero where zero makes no sense, fall back to the
/// default.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_max_connections: u32,
    pub cache: CacheManagerConfig,
    /// Back the report and chart stores with the shared PostgreSQL tier.
    pub cache_remote_tier: bool,
    pub cache_cleanup_interval: Duration,
    pub dispatch_poll_interval: Duration,
    pub max_concurrent_reports: usize,
    pub pipeline: PipelineConfig,
    pub export_dir: PathBuf,
    pub inventory_snapshot: PathBuf,
    pub webhook_url: Option<String>,
    /// Email recipient for notifications that name none.
    pub default_recipient: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                 |
    /// |----------------------------------|-------------------------|
    /// | `DATABASE_MAX_CONNECTIONS`       | `10`                    |
    /// | `REPORT_CACHE_MAX_ENTRIES`       | `256`                   |
    /// | `REPORT_CACHE_TTL_SECS`          | `3600`                  |
    /// | `CHART_CACHE_MAX_ENTRIES`        | `1024`                  |
    /// | `CHART_CACHE_TTL_SECS`           | `1800`                  |
    /// | `QUERY_CACHE_MAX_ENTRIES`        | `2048`                  |
    /// | `QUERY_CACHE_TTL_SECS`           | `300`                   |
    /// | `CACHE_REMOTE_TIER`              | `false`                 |
    /// | `CACHE_CLEANUP_INTERVAL_SECS`    | `300`                   |
    /// | `DISPATCH_POLL_INTERVAL_SECS`    | `2`                     |
    /// | `MAX_CONCURRENT_REPORTS`         | `4`                     |
    /// | `COLLABORATOR_TIMEOUT_SECS`      | `120`                   |
    /// | `PARALLEL_SECTIONS`              | `true`                  |
    /// | `REPORT_BASE_URL`                | `http://localhost:3000` |
    /// | `EXPORT_DIR`                     | `./exports`             |
    /// | `INVENTORY_SNAPSHOT`             | `./inventory.json`      |
    /// | `NOTIFICATION_WEBHOOK_URL`       | unset                   |
    /// | `NOTIFICATION_DEFAULT_RECIPIENT` | unset                   |
    ///
    /// `DATABASE_URL` and the `SMTP_*` variables are read where they are
    /// used.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(lookup);

        let store = |entries_key: &str, ttl_key: &str, entries: usize, ttl_secs: u64| {
            CacheConfig::new(
                env.positive(entries_key, entries),
                Some(Duration::from_secs(env.positive(ttl_key, ttl_secs))),
            )
        };
        let cache = CacheManagerConfig {
            reports: store(
                "REPORT_CACHE_MAX_ENTRIES",
                "REPORT_CACHE_TTL_SECS",
                DEFAULT_REPORT_ENTRIES,
                DEFAULT_REPORT_TTL_SECS,
            ),
            charts: store(
                "CHART_CACHE_MAX_ENTRIES",
                "CHART_CACHE_TTL_SECS",
                DEFAULT_CHART_ENTRIES,
                DEFAULT_CHART_TTL_SECS,
            ),
            queries: store(
                "QUERY_CACHE_MAX_ENTRIES",
                "QUERY_CACHE_TTL_SECS",
                DEFAULT_QUERY_ENTRIES,
                DEFAULT_QUERY_TTL_SECS,
            ),
        };

        let pipeline = PipelineConfig {
            collaborator_timeout: Duration::from_secs(
                env.positive("COLLABORATOR_TIMEOUT_SECS", DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            ),
            parallel_sections: env.flag("PARALLEL_SECTIONS", true),
            base_url: env
                .string("REPORT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ..Default::default()
        };

        Self {
            database_max_connections: env
                .positive("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            cache,
            cache_remote_tier: env.flag("CACHE_REMOTE_TIER", false),
            cache_cleanup_interval: Duration::from_secs(
                env.positive("CACHE_CLEANUP_INTERVAL_SECS", DEFAULT_CACHE_CLEANUP_INTERVAL_SECS),
            ),
            dispatch_poll_interval: Duration::from_secs(
                env.positive("DISPATCH_POLL_INTERVAL_SECS", DEFAULT_DISPATCH_POLL_INTERVAL_SECS),
            ),
            max_concurrent_reports: env
                .positive("MAX_CONCURRENT_REPORTS", DEFAULT_MAX_CONCURRENT_REPORTS),
            pipeline,
            export_dir: env
                .string("EXPORT_DIR")
                .unwrap_or_else(|| DEFAULT_EXPORT_DIR.to_string())
                .into(),
            inventory_snapshot: env
                .string("INVENTORY_SNAPSHOT")
                .unwrap_or_else(|| DEFAULT_INVENTORY_SNAPSHOT.to_string())
                .into(),
            webhook_url: env.string("NOTIFICATION_WEBHOOK_URL"),
            default_recipient: env.string("NOTIFICATION_DEFAULT_RECIPIENT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient parsing
// ---------------------------------------------------------------------------

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Trimmed, non-empty value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
                None
            }
        }
    }

    /// A count or duration that must be above zero.
    fn positive<T: FromStr + PartialOrd + Default>(&self, key: &str, default: T) -> T {
        self.parsed(key).filter(|v| *v > T::default()).unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
