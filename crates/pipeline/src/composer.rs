//! Content composition.
//!
//! [`base_content`] derives the display document from the dataset alone
//! and cannot fail. [`compose`] layers narrative sections and chart
//! references on top; when it fails the caller keeps the base content.

use std::collections::BTreeMap;

use vigil_core::dataset::{Dataset, Severity, Vulnerability};
use vigil_core::report::{
    ChartPayload, ChartReference, ContentSection, ContentSummary, FindingBrief, NarrativeSection,
    Report, ReportContent,
};

use crate::error::ComposeError;
use crate::narrative::{analysis_title, ANALYSIS_EXECUTIVE_SUMMARY, ANALYSIS_TYPES};

pub fn finding_brief(v: &Vulnerability) -> FindingBrief {
    FindingBrief {
        id: v.id,
        title: v.title.clone(),
        severity: v.severity,
        cvss_score: v.cvss_score,
        cve_id: v.cve_id.clone(),
        asset_id: v.asset_id,
    }
}

pub fn content_summary(dataset: &Dataset) -> ContentSummary {
    ContentSummary {
        asset_count: dataset.assets.len() as u32,
        vulnerability_count: dataset.vulnerabilities.len() as u32,
        severity_counts: dataset.risk.severity_counts,
        open_count: dataset.risk.open_count,
        resolved_count: dataset.risk.resolved_count,
        risk_score: dataset.risk.overall_score,
        mean_cvss: dataset.risk.mean_cvss,
    }
}

/// Summary text used when no narrative summary is available: asset count,
/// finding counts by severity and the risk score.
pub fn templated_summary(summary: &ContentSummary) -> String {
    let by_severity = Severity::DESCENDING
        .iter()
        .map(|s| format!("{}: {}", s.label(), summary.severity_counts.get(*s)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "This report covers {} assets with {} vulnerabilities ({} open). \
         Open findings by severity: {}. Overall risk score: {:.1}/100.",
        summary.asset_count,
        summary.vulnerability_count,
        summary.open_count,
        by_severity,
        summary.risk_score
    )
}

/// Display document built from the dataset alone.
pub fn base_content(report: &Report, dataset: &Dataset) -> ReportContent {
    let limit = report.detail_level.listing_limit();
    let summary = content_summary(dataset);

    ReportContent {
        title: report.title.clone(),
        report_type: report.report_type.clone(),
        period_start: report.period_start,
        period_end: report.period_end,
        executive_summary: templated_summary(&summary),
        summary,
        sections: Vec::new(),
        key_findings: dataset
            .top_vulnerabilities(limit)
            .into_iter()
            .map(finding_brief)
            .collect(),
        top_assets: dataset
            .risk
            .highest_risk_assets
            .iter()
            .take(limit)
            .cloned()
            .collect(),
        charts: Vec::new(),
        templated_summary: true,
    }
}

/// Known analysis types in catalogue order, then custom types by name.
fn section_rank(key: &str) -> (usize, &str) {
    let idx = ANALYSIS_TYPES
        .iter()
        .position(|t| *t == key)
        .unwrap_or(ANALYSIS_TYPES.len());
    (idx, key)
}

/// Merge narrative sections and chart references into `base`.
///
/// The executive summary narrative, when present, replaces the templated
/// summary; every other narrative becomes a section. Fails if the
/// serialized result exceeds `max_bytes`.
pub fn compose(
    base: &ReportContent,
    narratives: &BTreeMap<String, NarrativeSection>,
    charts: &BTreeMap<String, ChartPayload>,
    max_bytes: usize,
) -> Result<ReportContent, ComposeError> {
    let mut content = base.clone();

    if let Some(summary) = narratives.get(ANALYSIS_EXECUTIVE_SUMMARY) {
        content.executive_summary = summary.markdown.clone();
        content.templated_summary = false;
    }

    let mut keys: Vec<&String> = narratives
        .keys()
        .filter(|k| k.as_str() != ANALYSIS_EXECUTIVE_SUMMARY)
        .collect();
    keys.sort_by(|a, b| section_rank(a).cmp(&section_rank(b)));

    content.sections = keys
        .into_iter()
        .filter_map(|key| {
            narratives.get(key).map(|section| ContentSection {
                key: key.clone(),
                title: analysis_title(key),
                markdown: section.markdown.clone(),
            })
        })
        .collect();

    content.charts = charts
        .values()
        .map(|chart| ChartReference {
            chart_type: chart.chart_type.clone(),
            title: chart.title.clone(),
        })
        .collect();

    let size = serde_json::to_vec(&content)?.len();
    if size > max_bytes {
        return Err(ComposeError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    Ok(content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use vigil_core::dataset::SeverityCounts;
    use vigil_core::report::{ChartSeries, NewReport};

    fn report() -> Report {
        Report::from_new(
            1,
            NewReport {
                title: "Monthly".into(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    fn dataset() -> Dataset {
        let mut dataset = Dataset::default();
        dataset.risk.severity_counts = SeverityCounts {
            critical: 1,
            high: 2,
            ..Default::default()
        };
        dataset.risk.open_count = 3;
        dataset.risk.overall_score = 12.25;
        dataset
    }

    fn section(markdown: &str) -> NarrativeSection {
        NarrativeSection {
            markdown: markdown.into(),
            created_at: Utc::now(),
            model: "m".into(),
            request_id: "r".into(),
        }
    }

    fn chart(chart_type: &str) -> ChartPayload {
        ChartPayload {
            chart_type: chart_type.into(),
            title: "T".into(),
            kind: "bar".into(),
            labels: vec!["x".into()],
            datasets: vec![ChartSeries {
                label: "s".into(),
                data: vec![1.0],
            }],
        }
    }

    #[test]
    fn templated_summary_lists_counts_and_score() {
        let text = templated_summary(&content_summary(&dataset()));
        assert!(text.contains("Critical: 1, High: 2, Medium: 0"));
        assert!(text.contains("12.2/100") || text.contains("12.3/100"));
    }

    #[test]
    fn base_content_tolerates_empty_dataset() {
        let content = base_content(&report(), &Dataset::default());
        assert_eq!(content.title, "Monthly");
        assert_eq!(content.summary.asset_count, 0);
        assert!(content.key_findings.is_empty());
        assert!(content.templated_summary);
    }

    #[test]
    fn narrative_summary_replaces_template_and_sections_are_ordered() {
        let base = base_content(&report(), &dataset());
        let mut narratives = BTreeMap::new();
        narratives.insert("remediation_plan".to_string(), section("fix"));
        narratives.insert("risk_assessment".to_string(), section("risk"));
        narratives.insert(ANALYSIS_EXECUTIVE_SUMMARY.to_string(), section("exec"));
        let mut charts = BTreeMap::new();
        charts.insert("asset_risk".to_string(), chart("asset_risk"));

        let content = compose(&base, &narratives, &charts, usize::MAX).unwrap();

        assert_eq!(content.executive_summary, "exec");
        assert!(!content.templated_summary);
        let keys: Vec<&str> = content.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["risk_assessment", "remediation_plan"]);
        assert_eq!(content.charts.len(), 1);
    }

    #[test]
    fn no_narratives_keeps_templated_summary() {
        let base = base_content(&report(), &dataset());
        let content = compose(&base, &BTreeMap::new(), &BTreeMap::new(), usize::MAX).unwrap();
        assert_eq!(content.executive_summary, base.executive_summary);
        assert!(content.templated_summary);
    }

    #[test]
    fn oversized_content_fails() {
        let base = base_content(&report(), &dataset());
        assert_matches!(
            compose(&base, &BTreeMap::new(), &BTreeMap::new(), 16),
            Err(ComposeError::TooLarge { limit: 16, .. })
        );
    }
}
