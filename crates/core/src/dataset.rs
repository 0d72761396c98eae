//! Compiled security dataset.
//!
//! A [`Dataset`] is what the data compiler produces for one report scope
//! and period: the assets in scope, their vulnerabilities, aggregate risk
//! statistics and a daily discovery/resolution timeline. Every field
//! defaults when absent so downstream consumers never have to guard
//! against partial payloads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Vulnerability severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities from most to least severe (display order).
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// Weight of one open finding of this severity in risk scoring.
    pub fn risk_weight(self) -> f64 {
        match self {
            Self::Info => 0.0,
            Self::Low => 1.0,
            Self::Medium => 4.0,
            Self::High => 7.0,
            Self::Critical => 10.0,
        }
    }

    /// Map a CVSS base score onto the qualitative severity scale.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Info
        }
    }
}

/// Remediation state of a single finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Accepted,
}

impl VulnerabilityStatus {
    pub const ALL: [VulnerabilityStatus; 4] = [
        VulnerabilityStatus::Open,
        VulnerabilityStatus::InProgress,
        VulnerabilityStatus::Resolved,
        VulnerabilityStatus::Accepted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Accepted => "accepted",
        }
    }

    /// Open and in-progress findings still carry risk.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    /// Computed by the compiler, 0-100.
    #[serde(default)]
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: DbId,
    pub asset_id: DbId,
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub cvss_score: Option<f64>,
    #[serde(default)]
    pub cve_id: Option<String>,
    #[serde(default)]
    pub status: VulnerabilityStatus,
    pub discovered_at: Timestamp,
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Finding counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
}

impl SeverityCounts {
    pub fn tally<'a>(vulns: impl IntoIterator<Item = &'a Vulnerability>) -> Self {
        let mut counts = Self::default();
        for v in vulns {
            counts.increment(v.severity);
        }
        counts
    }

    pub fn increment(&mut self, severity: Severity) {
        *self.slot(severity) += 1;
    }

    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low + self.info
    }

    fn slot(&mut self, severity: Severity) -> &mut u32 {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        }
    }
}

/// Risk ranking entry for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRisk {
    pub asset_id: DbId,
    pub name: String,
    pub risk_score: f64,
    pub open_findings: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskStatistics {
    /// Overall risk score for the scope, 0-100.
    pub overall_score: f64,
    pub severity_counts: SeverityCounts,
    pub open_count: u32,
    pub resolved_count: u32,
    pub mean_cvss: Option<f64>,
    /// Highest-risk assets first.
    pub highest_risk_assets: Vec<AssetRisk>,
}

/// Findings discovered and resolved on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub discovered: u32,
    pub resolved: u32,
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub assets: Vec<Asset>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub risk: RiskStatistics,
    pub timeline: Vec<TimelinePoint>,
    pub compiled_at: Option<Timestamp>,
}

impl Dataset {
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn has_critical(&self) -> bool {
        self.risk.severity_counts.critical > 0
            || self
                .vulnerabilities
                .iter()
                .any(|v| v.severity == Severity::Critical && v.status.is_active())
    }

    /// Active findings sorted by severity then CVSS, most severe first.
    pub fn top_vulnerabilities(&self, limit: usize) -> Vec<&Vulnerability> {
        let mut active: Vec<&Vulnerability> = self
            .vulnerabilities
            .iter()
            .filter(|v| v.status.is_active())
            .collect();
        active.sort_by(|a, b| {
            b.severity.cmp(&a.severity).then_with(|| {
                b.cvss_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.cvss_score.unwrap_or(0.0))
            })
        });
        active.truncate(limit);
        active
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
