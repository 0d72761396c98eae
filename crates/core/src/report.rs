//! Report entity, configuration and composed content.
//!
//! The [`Report`] is the unit of work driven through the generation
//! pipeline. Its `metadata` is a typed option set rather than a free-form
//! map: recognized keys are listed in [`RECOGNIZED_METADATA_KEYS`] and any
//! other key found in stored JSON is ignored on read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::{Asset, AssetRisk, Severity, SeverityCounts};
use crate::status::ReportStatus;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Metadata keys understood by the pipeline.
pub const RECOGNIZED_METADATA_KEYS: &[&str] = &[
    "include_charts",
    "chart_types",
    "include_ai_analysis",
    "ai_analysis_types",
    "auto_export",
    "export_format",
    "notify_completion",
    "notification_email",
    "error_message",
    "export_location",
    "exported_at",
];

/// Export format used when the metadata does not name one.
pub const DEFAULT_EXPORT_FORMAT: &str = "json";

/// Default report type tag passed to narrative generation.
pub const DEFAULT_REPORT_TYPE: &str = "security_assessment";

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which assets a report covers.
///
/// Every non-empty filter must match; empty filters are unrestricted, so
/// the default scope covers all assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub asset_ids: Vec<DbId>,
    pub asset_types: Vec<String>,
    pub environments: Vec<String>,
    pub tags: Vec<String>,
    pub groups: Vec<String>,
}

impl ScopeConfig {
    pub fn is_unrestricted(&self) -> bool {
        self.asset_ids.is_empty()
            && self.asset_types.is_empty()
            && self.environments.is_empty()
            && self.tags.is_empty()
            && self.groups.is_empty()
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        if !self.asset_ids.is_empty() && !self.asset_ids.contains(&asset.id) {
            return false;
        }
        if !self.asset_types.is_empty() && !self.asset_types.contains(&asset.asset_type) {
            return false;
        }
        if !self.environments.is_empty() {
            match &asset.environment {
                Some(env) if self.environments.contains(env) => {}
                _ => return false,
            }
        }
        if !self.tags.is_empty() && !asset.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if !self.groups.is_empty() && !asset.groups.iter().any(|g| self.groups.contains(g)) {
            return false;
        }
        true
    }
}

/// How much detail the compiled content carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Summary,
    #[default]
    Standard,
    Detailed,
}

impl DetailLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
        }
    }

    /// Number of key findings and ranked assets listed in base content.
    pub fn listing_limit(self) -> usize {
        match self {
            Self::Summary => 5,
            Self::Standard => 15,
            Self::Detailed => 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMetadata {
    pub include_charts: bool,
    pub chart_types: Vec<String>,
    pub include_ai_analysis: bool,
    pub ai_analysis_types: Vec<String>,
    pub auto_export: bool,
    pub export_format: Option<String>,
    pub notify_completion: bool,
    pub notification_email: Option<String>,
    /// Set only when generation failed.
    pub error_message: Option<String>,
    /// Artifact written by auto-export.
    pub export_location: Option<String>,
    pub exported_at: Option<Timestamp>,
}

impl ReportMetadata {
    /// Chart types to generate, or empty when charts are disabled.
    pub fn requested_charts(&self) -> &[String] {
        if self.include_charts {
            &self.chart_types
        } else {
            &[]
        }
    }

    /// Analysis types to generate, or empty when analysis is disabled.
    pub fn requested_analyses(&self) -> &[String] {
        if self.include_ai_analysis {
            &self.ai_analysis_types
        } else {
            &[]
        }
    }

    pub fn export_format(&self) -> &str {
        self.export_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_EXPORT_FORMAT)
    }
}

// ---------------------------------------------------------------------------
// Narrative and chart payloads
// ---------------------------------------------------------------------------

/// Normalized narrative output for one analysis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeSection {
    pub markdown: String,
    pub created_at: Timestamp,
    pub model: String,
    pub request_id: String,
}

/// Outcome recorded per requested analysis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisEntry {
    Narrative(NarrativeSection),
    Error { error: String, failed_at: Timestamp },
}

impl AnalysisEntry {
    pub fn narrative(&self) -> Option<&NarrativeSection> {
        match self {
            Self::Narrative(section) => Some(section),
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<f64>,
}

/// Render-ready chart data for one chart type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub chart_type: String,
    pub title: String,
    /// Rendering hint, e.g. `bar`, `pie`, `line`.
    pub kind: String,
    pub labels: Vec<String>,
    pub datasets: Vec<ChartSeries>,
}

// ---------------------------------------------------------------------------
// Composed content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSummary {
    pub asset_count: u32,
    pub vulnerability_count: u32,
    pub severity_counts: SeverityCounts,
    pub open_count: u32,
    pub resolved_count: u32,
    pub risk_score: f64,
    pub mean_cvss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingBrief {
    pub id: DbId,
    pub title: String,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cve_id: Option<String>,
    pub asset_id: DbId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSection {
    pub key: String,
    pub title: String,
    pub markdown: String,
}

/// Chart listed in the document; the data lives in `Report::charts_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartReference {
    pub chart_type: String,
    pub title: String,
}

/// The displayable report document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportContent {
    pub title: String,
    pub report_type: String,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub summary: ContentSummary,
    pub executive_summary: String,
    pub sections: Vec<ContentSection>,
    pub key_findings: Vec<FindingBrief>,
    pub top_assets: Vec<AssetRisk>,
    pub charts: Vec<ChartReference>,
    /// True when the executive summary is the templated fallback.
    pub templated_summary: bool,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: DbId,
    pub title: String,
    pub report_type: String,
    pub status: ReportStatus,
    pub scope_config: ScopeConfig,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub detail_level: DetailLevel,
    pub metadata: ReportMetadata,
    pub content: Option<ReportContent>,
    pub charts_data: BTreeMap<String, ChartPayload>,
    pub ai_analysis: BTreeMap<String, AnalysisEntry>,
    pub generated_at: Option<Timestamp>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Report {
    /// Materialize a freshly created, pending report.
    pub fn from_new(id: DbId, input: NewReport, now: Timestamp) -> Self {
        Self {
            id,
            title: input.title,
            report_type: input
                .report_type
                .unwrap_or_else(|| DEFAULT_REPORT_TYPE.to_string()),
            status: ReportStatus::Pending,
            scope_config: input.scope_config,
            period_start: input.period_start,
            period_end: input.period_end,
            detail_level: input.detail_level,
            metadata: input.metadata,
            content: None,
            charts_data: BTreeMap::new(),
            ai_analysis: BTreeMap::new(),
            generated_at: None,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Return to `Pending`, dropping every generated artifact.
    pub fn reset_for_regeneration(&mut self, now: Timestamp) {
        self.status = ReportStatus::Pending;
        self.content = None;
        self.ai_analysis.clear();
        self.charts_data.clear();
        self.generated_at = None;
        self.metadata.error_message = None;
        self.metadata.export_location = None;
        self.metadata.exported_at = None;
        self.updated_at = now;
    }

    /// Terminal-state invariants: completed reports carry content and a
    /// generation time, failed reports carry an error message.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ReportStatus::Completed => self.content.is_some() && self.generated_at.is_some(),
            ReportStatus::Failed => self.metadata.error_message.is_some(),
            ReportStatus::Pending | ReportStatus::Generating => true,
        }
    }
}

/// Input for creating a report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    pub title: String,
    pub report_type: Option<String>,
    #[serde(default)]
    pub scope_config: ScopeConfig,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    #[serde(default)]
    pub detail_level: DetailLevel,
    #[serde(default)]
    pub metadata: ReportMetadata,
    pub created_by: Option<DbId>,
}

/// Answer to a status query. Sub-fields that could not be computed are
/// `None`/`0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportStatusView {
    pub status: Option<ReportStatus>,
    pub progress: u8,
    pub error_message: Option<String>,
    pub generated_at: Option<Timestamp>,
}

impl ReportStatusView {
    pub fn unavailable() -> Self {
        Self {
            status: None,
            progress: 0,
            error_message: None,
            generated_at: None,
        }
    }
}

impl From<&Report> for ReportStatusView {
    fn from(report: &Report) -> Self {
        Self {
            status: Some(report.status),
            progress: report.status.progress(),
            error_message: report.metadata.error_message.clone(),
            generated_at: report.generated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
