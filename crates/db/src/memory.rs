//! In-process [`ReportStore`].
//!
//! Applies the same guarded transitions as the PostgreSQL store so the
//! pipeline behaves identically against either.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vigil_core::report::{NewReport, Report, ReportMetadata};
use vigil_core::status::ReportStatus;
use vigil_core::types::DbId;

use crate::error::StoreError;
use crate::store::{CompletedReport, ReportStore};

#[derive(Debug)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<DbId, Report>>,
    next_id: AtomicI64,
}

impl Default for MemoryReportStore {
    fn default() -> Self {
        Self {
            reports: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `f` if the report exists and its status is in `from`.
    async fn transition(
        &self,
        id: DbId,
        from: &[ReportStatus],
        f: impl FnOnce(&mut Report),
    ) -> bool {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&id) {
            Some(report) if from.contains(&report.status) => {
                f(report);
                report.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn create(&self, input: NewReport) -> Result<Report, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let report = Report::from_new(id, input, Utc::now());
        self.reports.write().await.insert(id, report.clone());
        Ok(report)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.read().await.get(&id).cloned())
    }

    async fn mark_generating(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(self
            .transition(id, &[ReportStatus::Pending], |r| {
                r.status = ReportStatus::Generating;
            })
            .await)
    }

    async fn complete(&self, id: DbId, outcome: &CompletedReport) -> Result<bool, StoreError> {
        Ok(self
            .transition(id, &[ReportStatus::Generating], |r| {
                r.status = ReportStatus::Completed;
                r.content = Some(outcome.content.clone());
                r.charts_data = outcome.charts_data.clone();
                r.ai_analysis = outcome.ai_analysis.clone();
                r.generated_at = Some(outcome.generated_at);
                r.metadata.error_message = None;
            })
            .await)
    }

    async fn fail(&self, id: DbId, error_message: &str) -> Result<bool, StoreError> {
        Ok(self
            .transition(
                id,
                &[ReportStatus::Generating],
                |r| {
                    r.status = ReportStatus::Failed;
                    r.content = None;
                    r.generated_at = None;
                    r.metadata.error_message = Some(error_message.to_string());
                },
            )
            .await)
    }

    async fn reset(&self, id: DbId) -> Result<bool, StoreError> {
        let now = Utc::now();
        Ok(self
            .transition(
                id,
                &[ReportStatus::Completed, ReportStatus::Failed],
                |r| r.reset_for_regeneration(now),
            )
            .await)
    }

    async fn update_metadata(&self, id: DbId, metadata: &ReportMetadata) -> Result<(), StoreError> {
        let mut reports = self.reports.write().await;
        let report = reports.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        report.metadata = metadata.clone();
        report.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        let reports = self.reports.read().await;
        let mut pending: Vec<&Report> = reports
            .values()
            .filter(|r| r.status == ReportStatus::Pending)
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.id));
        Ok(pending
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|r| r.id)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
