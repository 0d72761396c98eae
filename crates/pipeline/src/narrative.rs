//! Narrative generation contract and the offline template generator.
//!
//! Backends may return bare text or a partially filled section; every
//! success passes through [`normalize`] so that stored analysis entries
//! always carry `markdown`, `created_at`, `model` and `request_id`.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use vigil_core::dataset::{AssetRisk, Dataset, Severity, SeverityCounts, TimelinePoint};
use vigil_core::report::{DetailLevel, FindingBrief, NarrativeSection};
use vigil_core::types::Timestamp;

use crate::composer::finding_brief;
use crate::error::NarrativeError;

// ---------------------------------------------------------------------------
// Analysis types
// ---------------------------------------------------------------------------

pub const ANALYSIS_EXECUTIVE_SUMMARY: &str = "executive_summary";
pub const ANALYSIS_RISK_ASSESSMENT: &str = "risk_assessment";
pub const ANALYSIS_BUSINESS_IMPACT: &str = "business_impact";
pub const ANALYSIS_REMEDIATION_PLAN: &str = "remediation_plan";
pub const ANALYSIS_TREND_ANALYSIS: &str = "trend_analysis";
pub const ANALYSIS_TECHNICAL_DETAILS: &str = "technical_details";

pub const ANALYSIS_TYPES: &[&str] = &[
    ANALYSIS_EXECUTIVE_SUMMARY,
    ANALYSIS_RISK_ASSESSMENT,
    ANALYSIS_BUSINESS_IMPACT,
    ANALYSIS_REMEDIATION_PLAN,
    ANALYSIS_TREND_ANALYSIS,
    ANALYSIS_TECHNICAL_DETAILS,
];

/// Model tag recorded for template-generated sections.
pub const OFFLINE_MODEL: &str = "offline-template";

/// Display title for an analysis type.
pub fn analysis_title(analysis_type: &str) -> String {
    match analysis_type {
        ANALYSIS_EXECUTIVE_SUMMARY => "Executive Summary".to_string(),
        ANALYSIS_RISK_ASSESSMENT => "Risk Assessment".to_string(),
        ANALYSIS_BUSINESS_IMPACT => "Business Impact".to_string(),
        ANALYSIS_REMEDIATION_PLAN => "Remediation Plan".to_string(),
        ANALYSIS_TREND_ANALYSIS => "Trend Analysis".to_string(),
        ANALYSIS_TECHNICAL_DETAILS => "Technical Details".to_string(),
        other => other
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The dataset fragment handed to narrative backends.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub report_title: String,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub asset_count: u32,
    pub vulnerability_count: u32,
    pub severity_counts: SeverityCounts,
    pub open_count: u32,
    pub resolved_count: u32,
    pub risk_score: f64,
    pub mean_cvss: Option<f64>,
    pub top_findings: Vec<FindingBrief>,
    pub top_assets: Vec<AssetRisk>,
    pub timeline: Vec<TimelinePoint>,
}

impl AnalysisContext {
    pub fn from_dataset(
        report_title: &str,
        dataset: &Dataset,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
        detail_level: DetailLevel,
    ) -> Self {
        let limit = detail_level.listing_limit();
        Self {
            report_title: report_title.to_string(),
            period_start,
            period_end,
            asset_count: dataset.assets.len() as u32,
            vulnerability_count: dataset.vulnerabilities.len() as u32,
            severity_counts: dataset.risk.severity_counts,
            open_count: dataset.risk.open_count,
            resolved_count: dataset.risk.resolved_count,
            risk_score: dataset.risk.overall_score,
            mean_cvss: dataset.risk.mean_cvss,
            top_findings: dataset
                .top_vulnerabilities(limit)
                .into_iter()
                .map(finding_brief)
                .collect(),
            top_assets: dataset.risk.highest_risk_assets.iter().take(limit).cloned().collect(),
            timeline: dataset.timeline.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// What a backend returned for one analysis type.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeOutput {
    /// Bare markdown text.
    Text(String),
    /// A section with whatever metadata the backend supplied.
    Section {
        markdown: String,
        model: Option<String>,
        request_id: Option<String>,
        created_at: Option<Timestamp>,
    },
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(
        &self,
        analysis_type: &str,
        context: &AnalysisContext,
        report_type: &str,
    ) -> Result<NarrativeOutput, NarrativeError>;

    /// Model tag recorded when the backend does not name one.
    fn model_name(&self) -> &str;
}

/// Fill in the section metadata a backend left out.
///
/// Empty or whitespace-only markdown is an error.
pub fn normalize(
    output: NarrativeOutput,
    default_model: &str,
    now: Timestamp,
) -> Result<NarrativeSection, NarrativeError> {
    let (markdown, model, request_id, created_at) = match output {
        NarrativeOutput::Text(markdown) => (markdown, None, None, None),
        NarrativeOutput::Section {
            markdown,
            model,
            request_id,
            created_at,
        } => (markdown, model, request_id, created_at),
    };

    let markdown = markdown.trim().to_string();
    if markdown.is_empty() {
        return Err(NarrativeError::Empty);
    }

    Ok(NarrativeSection {
        markdown,
        created_at: created_at.unwrap_or(now),
        model: model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model.to_string()),
        request_id: request_id
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    })
}

// ---------------------------------------------------------------------------
// OfflineNarrativeGenerator
// ---------------------------------------------------------------------------

/// Deterministic template text, used when no model backend is configured.
#[derive(Debug, Clone, Default)]
pub struct OfflineNarrativeGenerator;

impl OfflineNarrativeGenerator {
    pub fn new() -> Self {
        Self
    }

    fn severity_line(counts: &SeverityCounts) -> String {
        Severity::DESCENDING
            .iter()
            .map(|s| format!("{} {}", counts.get(*s), s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn executive_summary(ctx: &AnalysisContext, report_type: &str) -> String {
        format!(
            "## Executive Summary\n\n\
             This {} covers {} assets with {} findings ({} open, {} resolved). \
             The overall risk score is {:.1}/100.\n\n\
             Open findings by severity: {}.",
            report_type.replace('_', " "),
            ctx.asset_count,
            ctx.vulnerability_count,
            ctx.open_count,
            ctx.resolved_count,
            ctx.risk_score,
            Self::severity_line(&ctx.severity_counts)
        )
    }

    fn risk_assessment(ctx: &AnalysisContext) -> String {
        let mut text = format!(
            "## Risk Assessment\n\nOverall risk score: {:.1}/100.",
            ctx.risk_score
        );
        if let Some(cvss) = ctx.mean_cvss {
            text.push_str(&format!(" Mean CVSS of scored findings: {cvss:.1}."));
        }
        if ctx.top_assets.is_empty() {
            text.push_str("\n\nNo asset carries open risk.");
        } else {
            text.push_str("\n\n| Asset | Risk | Open findings |\n|---|---|---|\n");
            for asset in &ctx.top_assets {
                text.push_str(&format!(
                    "| {} | {:.1} | {} |\n",
                    asset.name, asset.risk_score, asset.open_findings
                ));
            }
        }
        text
    }

    fn business_impact(ctx: &AnalysisContext) -> String {
        let urgent = ctx.severity_counts.critical + ctx.severity_counts.high;
        let exposure = if ctx.severity_counts.critical > 0 {
            "Critical findings expose affected services to immediate compromise."
        } else if urgent > 0 {
            "High-severity findings present material but contained exposure."
        } else {
            "No critical or high-severity exposure was identified."
        };
        format!(
            "## Business Impact\n\n{exposure} {urgent} findings require prioritized attention \
             across {} assets.",
            ctx.asset_count
        )
    }

    fn remediation_plan(ctx: &AnalysisContext) -> String {
        if ctx.top_findings.is_empty() {
            return "## Remediation Plan\n\nNo open findings require remediation.".to_string();
        }
        let mut text = "## Remediation Plan\n\n".to_string();
        for (i, finding) in ctx.top_findings.iter().enumerate() {
            let cve = finding
                .cve_id
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            text.push_str(&format!(
                "{}. [{}] {}{}\n",
                i + 1,
                finding.severity.label(),
                finding.title,
                cve
            ));
        }
        text
    }

    fn trend_analysis(ctx: &AnalysisContext) -> String {
        let discovered: u32 = ctx.timeline.iter().map(|p| p.discovered).sum();
        let resolved: u32 = ctx.timeline.iter().map(|p| p.resolved).sum();
        let direction = match discovered.cmp(&resolved) {
            std::cmp::Ordering::Greater => "growing",
            std::cmp::Ordering::Less => "shrinking",
            std::cmp::Ordering::Equal => "stable",
        };
        format!(
            "## Trend Analysis\n\n{discovered} findings were discovered and {resolved} resolved \
             over {} active days; the backlog is {direction}.",
            ctx.timeline.len()
        )
    }

    fn technical_details(ctx: &AnalysisContext) -> String {
        let mut text = format!(
            "## Technical Details\n\n{} findings across {} assets.\n",
            ctx.vulnerability_count, ctx.asset_count
        );
        for finding in &ctx.top_findings {
            let cvss = finding
                .cvss_score
                .map(|s| format!("{s:.1}"))
                .unwrap_or_else(|| "n/a".to_string());
            text.push_str(&format!(
                "\n- `{}` {} (asset {}, CVSS {})",
                finding.id, finding.title, finding.asset_id, cvss
            ));
        }
        text
    }
}

#[async_trait]
impl NarrativeGenerator for OfflineNarrativeGenerator {
    async fn generate(
        &self,
        analysis_type: &str,
        context: &AnalysisContext,
        report_type: &str,
    ) -> Result<NarrativeOutput, NarrativeError> {
        let markdown = match analysis_type {
            ANALYSIS_EXECUTIVE_SUMMARY => Self::executive_summary(context, report_type),
            ANALYSIS_RISK_ASSESSMENT => Self::risk_assessment(context),
            ANALYSIS_BUSINESS_IMPACT => Self::business_impact(context),
            ANALYSIS_REMEDIATION_PLAN => Self::remediation_plan(context),
            ANALYSIS_TREND_ANALYSIS => Self::trend_analysis(context),
            ANALYSIS_TECHNICAL_DETAILS => Self::technical_details(context),
            other => return Err(NarrativeError::UnsupportedType(other.to_string())),
        };
        Ok(NarrativeOutput::Section {
            markdown,
            model: Some(OFFLINE_MODEL.to_string()),
            request_id: None,
            created_at: None,
        })
    }

    fn model_name(&self) -> &str {
        OFFLINE_MODEL
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
