//! PostgreSQL implementation of [`ReportStore`] over the `reports` table.
//!
//! Status transitions are single guarded `UPDATE`s (`WHERE status_id IN
//! (...)`), so concurrent workers cannot both claim the same report.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use vigil_core::report::{NewReport, Report, ReportMetadata, DEFAULT_REPORT_TYPE};
use vigil_core::status::{ReportStatus, StatusId};
use vigil_core::types::DbId;

use crate::error::StoreError;
use crate::models::report::ReportRow;
use crate::store::{CompletedReport, ReportStore};

/// Column list for `reports` queries.
const COLUMNS: &str = "\
    id, title, report_type, status_id, scope_config, period_start, period_end, \
    detail_level, metadata, content, charts_data, ai_analysis, generated_at, \
    created_by, created_at, updated_at";

/// Statuses a report can be reset from.
const TERMINAL_STATUSES: [StatusId; 2] = [
    ReportStatus::Completed as StatusId,
    ReportStatus::Failed as StatusId,
];

#[derive(Debug, Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn create(&self, input: NewReport) -> Result<Report, StoreError> {
        let query = format!(
            "INSERT INTO reports \
                 (title, report_type, status_id, scope_config, period_start, period_end, \
                  detail_level, metadata, charts_data, ai_analysis, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{{}}'::jsonb, '{{}}'::jsonb, $9) \
             RETURNING {COLUMNS}"
        );
        let report_type = input
            .report_type
            .clone()
            .unwrap_or_else(|| DEFAULT_REPORT_TYPE.to_string());

        let row = sqlx::query_as::<_, ReportRow>(&query)
            .bind(&input.title)
            .bind(report_type)
            .bind(ReportStatus::Pending.id())
            .bind(Json(&input.scope_config))
            .bind(input.period_start)
            .bind(input.period_end)
            .bind(input.detail_level.as_str())
            .bind(Json(&input.metadata))
            .bind(input.created_by)
            .fetch_one(&self.pool)
            .await?;
        Report::try_from(row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Report>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM reports WHERE id = $1");
        sqlx::query_as::<_, ReportRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Report::try_from)
            .transpose()
    }

    async fn mark_generating(&self, id: DbId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reports SET status_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(ReportStatus::Generating.id())
        .bind(ReportStatus::Pending.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: DbId, outcome: &CompletedReport) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reports \
             SET status_id = $2, content = $3, charts_data = $4, ai_analysis = $5, \
                 generated_at = $6, metadata = metadata - 'error_message', \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $7",
        )
        .bind(id)
        .bind(ReportStatus::Completed.id())
        .bind(Json(&outcome.content))
        .bind(Json(&outcome.charts_data))
        .bind(Json(&outcome.ai_analysis))
        .bind(outcome.generated_at)
        .bind(ReportStatus::Generating.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(&self, id: DbId, error_message: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reports \
             SET status_id = $2, content = NULL, generated_at = NULL, \
                 metadata = jsonb_set(COALESCE(metadata, '{}'::jsonb), '{error_message}', to_jsonb($3::text)), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(ReportStatus::Failed.id())
        .bind(error_message)
        .bind(ReportStatus::Generating.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset(&self, id: DbId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reports \
             SET status_id = $2, content = NULL, charts_data = '{}'::jsonb, \
                 ai_analysis = '{}'::jsonb, generated_at = NULL, \
                 metadata = metadata - 'error_message' - 'export_location' - 'exported_at', \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(id)
        .bind(ReportStatus::Pending.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_metadata(&self, id: DbId, metadata: &ReportMetadata) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE reports SET metadata = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(Json(metadata))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        let ids = sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM reports WHERE status_id = $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2",
        )
        .bind(ReportStatus::Pending.id())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
