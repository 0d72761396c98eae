//! Data compilation: scope + period -> [`Dataset`].
//!
//! [`compile_dataset`] is the deterministic core: given the same inventory
//! and [`CompileRequest`] it always produces the same dataset (apart from
//! `compiled_at`). [`SnapshotDataCompiler`] feeds it from an inventory
//! snapshot file on disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use vigil_cache::key::{CacheKey, PREFIX_REPORT};
use vigil_core::dataset::{
    Asset, AssetRisk, Dataset, RiskStatistics, SeverityCounts, TimelinePoint, Vulnerability,
    VulnerabilityStatus,
};
use vigil_core::report::{DetailLevel, Report, ScopeConfig};
use vigil_core::types::{DbId, Timestamp};

use crate::error::CompileError;

/// Upper bound of a single asset's risk score.
pub const MAX_ASSET_RISK: f64 = 100.0;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The inputs that determine a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileRequest {
    pub scope_config: ScopeConfig,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub detail_level: DetailLevel,
}

impl CompileRequest {
    pub fn from_report(report: &Report) -> Self {
        Self {
            scope_config: report.scope_config.clone(),
            period_start: report.period_start,
            period_end: report.period_end,
            detail_level: report.detail_level,
        }
    }

    /// Cache key for the dataset of `report_id` under these inputs:
    /// `report_<id>_detail_level=..._period_end=..._period_start=..._scope=...`.
    pub fn cache_key(&self, report_id: DbId) -> String {
        let scope = serde_json::to_string(&self.scope_config).unwrap_or_default();
        CacheKey::scoped(PREFIX_REPORT, report_id)
            .param("detail_level", self.detail_level.as_str())
            .param("period_start", format_bound(self.period_start))
            .param("period_end", format_bound(self.period_end))
            .param("scope", scope)
            .build()
    }
}

fn format_bound(bound: Option<Timestamp>) -> String {
    bound.map(|t| t.to_rfc3339()).unwrap_or_else(|| "open".to_string())
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Produces the dataset for a report. A failure yields no partial dataset.
#[async_trait]
pub trait DataCompiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<Dataset, CompileError>;
}

// ---------------------------------------------------------------------------
// Pure compilation
// ---------------------------------------------------------------------------

/// Raw asset and vulnerability records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub assets: Vec<Asset>,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Whether a finding existed at some point within the period: discovered
/// before the end and not resolved before the start.
fn active_during(v: &Vulnerability, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
    if end.is_some_and(|end| v.discovered_at > end) {
        return false;
    }
    match (start, v.resolved_at) {
        (Some(start), Some(resolved)) => resolved >= start,
        _ => true,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Compile a dataset from raw records.
pub fn compile_dataset(
    inventory: &Inventory,
    request: &CompileRequest,
    now: Timestamp,
) -> Result<Dataset, CompileError> {
    if let (Some(start), Some(end)) = (request.period_start, request.period_end) {
        if start > end {
            return Err(CompileError::InvalidPeriod { start, end });
        }
    }

    let mut assets: Vec<Asset> = inventory
        .assets
        .iter()
        .filter(|a| request.scope_config.matches(a))
        .cloned()
        .collect();
    assets.sort_by_key(|a| a.id);
    let in_scope: HashSet<DbId> = assets.iter().map(|a| a.id).collect();

    let mut vulnerabilities: Vec<Vulnerability> = inventory
        .vulnerabilities
        .iter()
        .filter(|v| in_scope.contains(&v.asset_id))
        .filter(|v| active_during(v, request.period_start, request.period_end))
        .cloned()
        .collect();
    vulnerabilities.sort_by_key(|v| v.id);

    // Per-asset risk from active findings.
    let mut weights: HashMap<DbId, (f64, u32)> = HashMap::new();
    for v in vulnerabilities.iter().filter(|v| v.status.is_active()) {
        let slot = weights.entry(v.asset_id).or_default();
        slot.0 += v.severity.risk_weight();
        slot.1 += 1;
    }
    for asset in &mut assets {
        let (weight, _) = weights.get(&asset.id).copied().unwrap_or_default();
        asset.risk_score = round1(weight.min(MAX_ASSET_RISK));
    }

    let overall_score = if assets.is_empty() {
        0.0
    } else {
        round1(assets.iter().map(|a| a.risk_score).sum::<f64>() / assets.len() as f64)
    };

    let mut ranked: Vec<AssetRisk> = assets
        .iter()
        .map(|a| AssetRisk {
            asset_id: a.id,
            name: a.name.clone(),
            risk_score: a.risk_score,
            open_findings: weights.get(&a.id).map(|(_, n)| *n).unwrap_or(0),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    ranked.truncate(request.detail_level.listing_limit());

    let scored: Vec<f64> = vulnerabilities.iter().filter_map(|v| v.cvss_score).collect();
    let mean_cvss = if scored.is_empty() {
        None
    } else {
        Some(round1(scored.iter().sum::<f64>() / scored.len() as f64))
    };

    let risk = RiskStatistics {
        overall_score,
        severity_counts: SeverityCounts::tally(vulnerabilities.iter().filter(|v| v.status.is_active())),
        open_count: vulnerabilities.iter().filter(|v| v.status.is_active()).count() as u32,
        resolved_count: vulnerabilities
            .iter()
            .filter(|v| v.status == VulnerabilityStatus::Resolved)
            .count() as u32,
        mean_cvss,
        highest_risk_assets: ranked,
    };

    let timeline = build_timeline(&vulnerabilities, request.period_start, request.period_end);

    Ok(Dataset {
        assets,
        vulnerabilities,
        risk,
        timeline,
        compiled_at: Some(now),
    })
}

/// Daily discovered/resolved counts, only for days with activity inside
/// the period, oldest first.
fn build_timeline(
    vulnerabilities: &[Vulnerability],
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> Vec<TimelinePoint> {
    let within = |t: Timestamp| start.map_or(true, |s| t >= s) && end.map_or(true, |e| t <= e);
    let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();

    for v in vulnerabilities {
        if within(v.discovered_at) {
            days.entry(v.discovered_at.date_naive()).or_default().0 += 1;
        }
        if let Some(resolved) = v.resolved_at.filter(|t| within(*t)) {
            days.entry(resolved.date_naive()).or_default().1 += 1;
        }
    }

    days.into_iter()
        .map(|(date, (discovered, resolved))| TimelinePoint {
            date,
            discovered,
            resolved,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SnapshotDataCompiler
// ---------------------------------------------------------------------------

/// Compiles from a JSON inventory snapshot, re-read on every call.
#[derive(Debug, Clone)]
pub struct SnapshotDataCompiler {
    path: PathBuf,
}

impl SnapshotDataCompiler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Inventory, CompileError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DataCompiler for SnapshotDataCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<Dataset, CompileError> {
        let inventory = self.load().await?;
        let dataset = compile_dataset(&inventory, request, Utc::now())?;
        tracing::debug!(
            path = %self.path.display(),
            assets = dataset.assets.len(),
            vulnerabilities = dataset.vulnerabilities.len(),
            "Compiled dataset from inventory snapshot"
        );
        Ok(dataset)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
