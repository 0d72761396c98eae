//! The persistence contract used by the generation pipeline.
//!
//! Every status-changing method is a guarded transition: it only applies
//! when the stored report is in an allowed source state and reports whether
//! it did. Callers treat `Ok(false)` as "someone else moved the report".

use std::collections::BTreeMap;

use async_trait::async_trait;
use vigil_core::report::{AnalysisEntry, ChartPayload, NewReport, Report, ReportContent, ReportMetadata};
use vigil_core::types::{DbId, Timestamp};

use crate::error::StoreError;

/// Everything persisted when a report completes.
#[derive(Debug, Clone)]
pub struct CompletedReport {
    pub content: ReportContent,
    pub charts_data: BTreeMap<String, ChartPayload>,
    pub ai_analysis: BTreeMap<String, AnalysisEntry>,
    pub generated_at: Timestamp,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert a new `Pending` report.
    async fn create(&self, input: NewReport) -> Result<Report, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Report>, StoreError>;

    /// `Pending -> Generating`. Returns `false` if the report is missing or
    /// not `Pending`.
    async fn mark_generating(&self, id: DbId) -> Result<bool, StoreError>;

    /// `Generating -> Completed`, storing the generated artifacts.
    async fn complete(&self, id: DbId, outcome: &CompletedReport) -> Result<bool, StoreError>;

    /// `Generating -> Failed`, recording `error_message` in the
    /// metadata and clearing any content.
    async fn fail(&self, id: DbId, error_message: &str) -> Result<bool, StoreError>;

    /// `Completed | Failed -> Pending`, clearing content, charts, analysis,
    /// generation time, error message and the previous export.
    async fn reset(&self, id: DbId) -> Result<bool, StoreError>;

    /// Replace the metadata of an existing report.
    async fn update_metadata(&self, id: DbId, metadata: &ReportMetadata) -> Result<(), StoreError>;

    /// Oldest pending reports first.
    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError>;
}
