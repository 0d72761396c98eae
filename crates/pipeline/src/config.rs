use std::time::Duration;

use vigil_core::types::DbId;

/// Default upper bound for any single collaborator call.
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 120;

/// Default limit for the serialized composed document (4 MiB).
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 4 * 1024 * 1024;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Runtime knobs of the generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// TTL for compiled datasets. `None` uses the store default.
    pub dataset_ttl: Option<Duration>,
    /// TTL for chart payloads. `None` uses the store default.
    pub chart_ttl: Option<Duration>,
    /// Bound on each data compiler, narrative, chart and export call.
    pub collaborator_timeout: Duration,
    /// Run narrative and chart types concurrently within one report.
    pub parallel_sections: bool,
    /// Base for report links placed in notifications.
    pub base_url: String,
    pub max_content_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_ttl: None,
            chart_ttl: None,
            collaborator_timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            parallel_sections: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }
}

impl PipelineConfig {
    /// Link to one report, e.g. `http://localhost:3000/reports/5`.
    pub fn report_url(&self, report_id: DbId) -> String {
        format!("{}/reports/{report_id}", self.base_url.trim_end_matches('/'))
    }
}
