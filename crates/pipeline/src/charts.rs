//! Chart payload builders.
//!
//! Each chart type is a pure function of the dataset. Payloads are
//! renderer-agnostic: a `kind` hint plus labels and one or more numeric
//! series.

use std::collections::BTreeMap;

use async_trait::async_trait;
use vigil_core::dataset::{Dataset, Severity, VulnerabilityStatus};
use vigil_core::report::{ChartPayload, ChartSeries};

use crate::error::ChartError;

pub const CHART_SEVERITY_DISTRIBUTION: &str = "severity_distribution";
pub const CHART_CVSS_DISTRIBUTION: &str = "cvss_distribution";
pub const CHART_VULNERABILITY_TIMELINE: &str = "vulnerability_timeline";
pub const CHART_ASSET_RISK: &str = "asset_risk";
pub const CHART_STATUS_BREAKDOWN: &str = "status_breakdown";
pub const CHART_ASSET_TYPES: &str = "asset_types";

pub const CHART_TYPES: &[&str] = &[
    CHART_SEVERITY_DISTRIBUTION,
    CHART_CVSS_DISTRIBUTION,
    CHART_VULNERABILITY_TIMELINE,
    CHART_ASSET_RISK,
    CHART_STATUS_BREAKDOWN,
    CHART_ASSET_TYPES,
];

/// Display title for a chart type.
pub fn chart_title(chart_type: &str) -> &'static str {
    match chart_type {
        CHART_SEVERITY_DISTRIBUTION => "Open Findings by Severity",
        CHART_CVSS_DISTRIBUTION => "CVSS Score Distribution",
        CHART_VULNERABILITY_TIMELINE => "Discovered vs Resolved",
        CHART_ASSET_RISK => "Highest Risk Assets",
        CHART_STATUS_BREAKDOWN => "Findings by Status",
        CHART_ASSET_TYPES => "Assets by Type",
        _ => "Chart",
    }
}

#[async_trait]
pub trait ChartGenerator: Send + Sync {
    async fn build(&self, chart_type: &str, dataset: &Dataset) -> Result<ChartPayload, ChartError>;
}

/// Builds every type in [`CHART_TYPES`].
#[derive(Debug, Clone, Default)]
pub struct DefaultChartGenerator;

impl DefaultChartGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChartGenerator for DefaultChartGenerator {
    async fn build(&self, chart_type: &str, dataset: &Dataset) -> Result<ChartPayload, ChartError> {
        build_chart(chart_type, dataset)
    }
}

/// Dispatch to the builder for `chart_type`.
pub fn build_chart(chart_type: &str, dataset: &Dataset) -> Result<ChartPayload, ChartError> {
    match chart_type {
        CHART_SEVERITY_DISTRIBUTION => Ok(severity_distribution(dataset)),
        CHART_CVSS_DISTRIBUTION => Ok(cvss_distribution(dataset)),
        CHART_VULNERABILITY_TIMELINE => Ok(vulnerability_timeline(dataset)),
        CHART_ASSET_RISK => Ok(asset_risk(dataset)),
        CHART_STATUS_BREAKDOWN => Ok(status_breakdown(dataset)),
        CHART_ASSET_TYPES => Ok(asset_types(dataset)),
        other => Err(ChartError::UnknownType(other.to_string())),
    }
}

fn payload(chart_type: &str, kind: &str, labels: Vec<String>, datasets: Vec<ChartSeries>) -> ChartPayload {
    ChartPayload {
        chart_type: chart_type.to_string(),
        title: chart_title(chart_type).to_string(),
        kind: kind.to_string(),
        labels,
        datasets,
    }
}

fn series(label: &str, data: Vec<f64>) -> ChartSeries {
    ChartSeries {
        label: label.to_string(),
        data,
    }
}

pub fn severity_distribution(dataset: &Dataset) -> ChartPayload {
    let counts = &dataset.risk.severity_counts;
    payload(
        CHART_SEVERITY_DISTRIBUTION,
        "pie",
        Severity::DESCENDING.iter().map(|s| s.label().to_string()).collect(),
        vec![series(
            "Open findings",
            Severity::DESCENDING.iter().map(|s| f64::from(counts.get(*s))).collect(),
        )],
    )
}

/// CVSS buckets follow the qualitative rating scale; unscored findings are
/// left out.
pub fn cvss_distribution(dataset: &Dataset) -> ChartPayload {
    const BUCKETS: [(Severity, &str); 5] = [
        (Severity::Info, "None (0.0)"),
        (Severity::Low, "Low (0.1-3.9)"),
        (Severity::Medium, "Medium (4.0-6.9)"),
        (Severity::High, "High (7.0-8.9)"),
        (Severity::Critical, "Critical (9.0-10.0)"),
    ];

    let mut counts = [0u32; 5];
    for score in dataset.vulnerabilities.iter().filter_map(|v| v.cvss_score) {
        let bucket = Severity::from_cvss(score);
        if let Some(idx) = BUCKETS.iter().position(|(s, _)| *s == bucket) {
            counts[idx] += 1;
        }
    }

    payload(
        CHART_CVSS_DISTRIBUTION,
        "bar",
        BUCKETS.iter().map(|(_, label)| label.to_string()).collect(),
        vec![series("Findings", counts.iter().map(|c| f64::from(*c)).collect())],
    )
}

pub fn vulnerability_timeline(dataset: &Dataset) -> ChartPayload {
    payload(
        CHART_VULNERABILITY_TIMELINE,
        "line",
        dataset.timeline.iter().map(|p| p.date.to_string()).collect(),
        vec![
            series(
                "Discovered",
                dataset.timeline.iter().map(|p| f64::from(p.discovered)).collect(),
            ),
            series(
                "Resolved",
                dataset.timeline.iter().map(|p| f64::from(p.resolved)).collect(),
            ),
        ],
    )
}

pub fn asset_risk(dataset: &Dataset) -> ChartPayload {
    let assets = &dataset.risk.highest_risk_assets;
    payload(
        CHART_ASSET_RISK,
        "horizontal_bar",
        assets.iter().map(|a| a.name.clone()).collect(),
        vec![series("Risk score", assets.iter().map(|a| a.risk_score).collect())],
    )
}

pub fn status_breakdown(dataset: &Dataset) -> ChartPayload {
    let counts: Vec<f64> = VulnerabilityStatus::ALL
        .iter()
        .map(|status| {
            dataset
                .vulnerabilities
                .iter()
                .filter(|v| v.status == *status)
                .count() as f64
        })
        .collect();
    payload(
        CHART_STATUS_BREAKDOWN,
        "doughnut",
        VulnerabilityStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
        vec![series("Findings", counts)],
    )
}

pub fn asset_types(dataset: &Dataset) -> ChartPayload {
    let mut by_type: BTreeMap<&str, u32> = BTreeMap::new();
    for asset in &dataset.assets {
        let key = if asset.asset_type.is_empty() {
            "unknown"
        } else {
            asset.asset_type.as_str()
        };
        *by_type.entry(key).or_default() += 1;
    }
    payload(
        CHART_ASSET_TYPES,
        "pie",
        by_type.keys().map(|k| k.to_string()).collect(),
        vec![series("Assets", by_type.values().map(|c| f64::from(*c)).collect())],
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
