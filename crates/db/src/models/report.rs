//! Row shape of the `reports` table and its conversion to the domain type.
//!
//! Expected columns:
//!
//! | Column         | Type          | Notes                                 |
//! |----------------|---------------|---------------------------------------|
//! | `id`           | BIGSERIAL     |                                       |
//! | `title`        | TEXT          |                                       |
//! | `report_type`  | TEXT          |                                       |
//! | `status_id`    | SMALLINT      | FK to `report_statuses`               |
//! | `scope_config` | JSONB         |                                       |
//! | `period_start` | TIMESTAMPTZ   | nullable                              |
//! | `period_end`   | TIMESTAMPTZ   | nullable                              |
//! | `detail_level` | TEXT          | `summary`, `standard` or `detailed`   |
//! | `metadata`     | JSONB         | unknown keys are ignored on read      |
//! | `content`      | JSONB         | nullable                              |
//! | `charts_data`  | JSONB         | defaults to `{}`                      |
//! | `ai_analysis`  | JSONB         | defaults to `{}`                      |
//! | `generated_at` | TIMESTAMPTZ   | nullable                              |
//! | `created_by`   | BIGINT        | nullable                              |
//! | `created_at`   | TIMESTAMPTZ   |                                       |
//! | `updated_at`   | TIMESTAMPTZ   |                                       |

use serde::de::DeserializeOwned;
use sqlx::FromRow;
use vigil_core::report::{DetailLevel, Report};
use vigil_core::status::{ReportStatus, StatusId};
use vigil_core::types::{DbId, Timestamp};

use crate::error::StoreError;

/// A row from the `reports` table.
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    pub id: DbId,
    pub title: String,
    pub report_type: String,
    pub status_id: StatusId,
    pub scope_config: serde_json::Value,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub detail_level: String,
    pub metadata: serde_json::Value,
    pub content: Option<serde_json::Value>,
    pub charts_data: serde_json::Value,
    pub ai_analysis: serde_json::Value,
    pub generated_at: Option<Timestamp>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

fn decode<T: DeserializeOwned>(id: DbId, column: &str, value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode {
        id,
        reason: format!("{column}: {e}"),
    })
}

/// JSON `null` in a map column decodes as an empty map.
fn decode_map<T: DeserializeOwned + Default>(
    id: DbId,
    column: &str,
    value: serde_json::Value,
) -> Result<T, StoreError> {
    if value.is_null() {
        return Ok(T::default());
    }
    decode(id, column, value)
}

impl TryFrom<ReportRow> for Report {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let status = ReportStatus::from_id(row.status_id).ok_or_else(|| StoreError::Decode {
            id,
            reason: format!("unknown status id {}", row.status_id),
        })?;
        let detail_level: DetailLevel = decode(
            id,
            "detail_level",
            serde_json::Value::String(row.detail_level),
        )?;

        Ok(Report {
            id,
            title: row.title,
            report_type: row.report_type,
            status,
            scope_config: decode_map(id, "scope_config", row.scope_config)?,
            period_start: row.period_start,
            period_end: row.period_end,
            detail_level,
            metadata: decode_map(id, "metadata", row.metadata)?,
            content: row
                .content
                .filter(|c| !c.is_null())
                .map(|c| decode(id, "content", c))
                .transpose()?,
            charts_data: decode_map(id, "charts_data", row.charts_data)?,
            ai_analysis: decode_map(id, "ai_analysis", row.ai_analysis)?,
            generated_at: row.generated_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
