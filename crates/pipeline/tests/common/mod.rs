//! Shared fixtures for pipeline integration tests: an inventory, stub
//! collaborators that count or fail on demand, and a harness wiring them
//! to an in-memory store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use vigil_cache::{CacheManager, CacheManagerConfig};
use vigil_core::dataset::{Asset, Dataset, Severity, Vulnerability, VulnerabilityStatus};
use vigil_core::report::{ChartPayload, NewReport, Report, ReportMetadata};
use vigil_core::types::DbId;
use vigil_db::{CompletedReport, MemoryReportStore, ReportStore, StoreError};
use vigil_events::{Notification, NotificationEvent, NotificationService, NotifyError};
use vigil_pipeline::charts::build_chart;
use vigil_pipeline::compiler::compile_dataset;
use vigil_pipeline::narrative::{
    ANALYSIS_EXECUTIVE_SUMMARY, ANALYSIS_REMEDIATION_PLAN, ANALYSIS_RISK_ASSESSMENT,
};
use vigil_pipeline::{
    AnalysisContext, ChartError, ChartGenerator, Collaborators, CompileError, CompileRequest,
    DataCompiler, ExportError, ExportFormat, ExportService, Inventory, NarrativeError,
    NarrativeGenerator, NarrativeOutput, OfflineNarrativeGenerator, PipelineConfig, ReportPipeline,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn inventory() -> Inventory {
    let now = Utc::now();
    let asset = |id, name: &str, asset_type: &str| Asset {
        id,
        name: name.to_string(),
        asset_type: asset_type.to_string(),
        environment: Some("production".to_string()),
        tags: vec!["pci".to_string()],
        groups: vec![],
        risk_score: 0.0,
    };
    let vuln = |id, asset_id, title: &str, severity, cvss, status, resolved| Vulnerability {
        id,
        asset_id,
        title: title.to_string(),
        severity,
        cvss_score: Some(cvss),
        cve_id: None,
        status,
        discovered_at: now - ChronoDuration::days(10),
        resolved_at: resolved,
    };

    Inventory {
        assets: vec![asset(1, "web-01", "server"), asset(2, "db-01", "database")],
        vulnerabilities: vec![
            vuln(
                1,
                1,
                "Remote code execution in web framework",
                Severity::Critical,
                9.8,
                VulnerabilityStatus::Open,
                None,
            ),
            vuln(
                2,
                2,
                "Weak TLS configuration",
                Severity::High,
                7.4,
                VulnerabilityStatus::InProgress,
                None,
            ),
            vuln(
                3,
                2,
                "Verbose error pages",
                Severity::Medium,
                5.3,
                VulnerabilityStatus::Resolved,
                Some(now - ChronoDuration::days(2)),
            ),
        ],
    }
}

pub const NARRATIVE_TYPES: [&str; 3] = [
    ANALYSIS_EXECUTIVE_SUMMARY,
    ANALYSIS_RISK_ASSESSMENT,
    ANALYSIS_REMEDIATION_PLAN,
];

pub const CHART_TYPES: [&str; 2] = ["severity_distribution", "asset_risk"];

/// A report asking for three narratives, two charts and a completion
/// notification.
pub fn new_report(title: &str) -> NewReport {
    NewReport {
        title: title.to_string(),
        metadata: ReportMetadata {
            include_ai_analysis: true,
            ai_analysis_types: NARRATIVE_TYPES.iter().map(|t| t.to_string()).collect(),
            include_charts: true,
            chart_types: CHART_TYPES.iter().map(|t| t.to_string()).collect(),
            notify_completion: true,
            notification_email: Some("secops@example.com".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Stub collaborators
// ---------------------------------------------------------------------------

/// Compiles [`inventory`] and counts calls. Can fail a number of times or
/// stall before answering.
pub struct CountingCompiler {
    inventory: Inventory,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingCompiler {
    pub fn new() -> Self {
        Self {
            inventory: inventory(),
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataCompiler for CountingCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<Dataset, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CompileError::Source("inventory service unavailable".into()));
        }
        compile_dataset(&self.inventory, request, Utc::now())
    }
}

/// Offline narratives, except for the listed types which fail or stall.
#[derive(Default)]
pub struct ScriptedNarrative {
    failing: Vec<String>,
    stalling: Vec<String>,
}

impl ScriptedNarrative {
    pub fn failing(types: &[&str]) -> Self {
        Self {
            failing: types.iter().map(|t| t.to_string()).collect(),
            stalling: Vec::new(),
        }
    }

    pub fn stalling(types: &[&str]) -> Self {
        Self {
            failing: Vec::new(),
            stalling: types.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedNarrative {
    async fn generate(
        &self,
        analysis_type: &str,
        context: &AnalysisContext,
        report_type: &str,
    ) -> Result<NarrativeOutput, NarrativeError> {
        if self.failing.iter().any(|t| t == analysis_type) {
            return Err(NarrativeError::Backend("model overloaded".into()));
        }
        if self.stalling.iter().any(|t| t == analysis_type) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        OfflineNarrativeGenerator::new()
            .generate(analysis_type, context, report_type)
            .await
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
pub struct CountingCharts {
    builds: AtomicUsize,
}

impl CountingCharts {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChartGenerator for CountingCharts {
    async fn build(&self, chart_type: &str, dataset: &Dataset) -> Result<ChartPayload, ChartError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        build_chart(chart_type, dataset)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    unavailable: bool,
}

impl RecordingNotifier {
    pub fn unavailable() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            unavailable: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.sent().into_iter().map(|n| n.event).collect()
    }

    pub fn find(&self, event: NotificationEvent) -> Option<Notification> {
        self.sent().into_iter().find(|n| n.event == event)
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.unavailable {
            return Err(NotifyError::Unavailable("transport down".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingExporter {
    exports: Mutex<Vec<(i64, ExportFormat)>>,
}

impl RecordingExporter {
    pub fn exports(&self) -> Vec<(i64, ExportFormat)> {
        self.exports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExportService for RecordingExporter {
    async fn export(&self, report: &Report, format: ExportFormat) -> Result<String, ExportError> {
        if report.content.is_none() {
            return Err(ExportError::NoContent(report.id));
        }
        self.exports.lock().unwrap().push((report.id, format));
        Ok(format!("memory://report_{}.{}", report.id, format.extension()))
    }
}

// ---------------------------------------------------------------------------
// Store with injectable read and claim errors
// ---------------------------------------------------------------------------

pub struct FlakyStore {
    inner: Arc<MemoryReportStore>,
    failing_reads: AtomicUsize,
    failing_claims: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: Arc<MemoryReportStore>) -> Self {
        Self {
            inner,
            failing_reads: AtomicUsize::new(0),
            failing_claims: AtomicUsize::new(0),
        }
    }

    /// The next `find_by_id` returns an error.
    pub fn fail_next_read(&self) {
        self.failing_reads.fetch_add(1, Ordering::SeqCst);
    }

    /// The next `mark_generating` returns an error.
    pub fn fail_next_claim(&self) {
        self.failing_claims.fetch_add(1, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn connection_reset(id: DbId) -> StoreError {
    StoreError::Decode {
        id,
        reason: "connection reset by peer".into(),
    }
}

#[async_trait]
impl ReportStore for FlakyStore {
    async fn create(&self, input: NewReport) -> Result<Report, StoreError> {
        self.inner.create(input).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Report>, StoreError> {
        if Self::take(&self.failing_reads) {
            return Err(connection_reset(id));
        }
        self.inner.find_by_id(id).await
    }

    async fn mark_generating(&self, id: DbId) -> Result<bool, StoreError> {
        if Self::take(&self.failing_claims) {
            return Err(connection_reset(id));
        }
        self.inner.mark_generating(id).await
    }

    async fn complete(&self, id: DbId, outcome: &CompletedReport) -> Result<bool, StoreError> {
        self.inner.complete(id, outcome).await
    }

    async fn fail(&self, id: DbId, error_message: &str) -> Result<bool, StoreError> {
        self.inner.fail(id, error_message).await
    }

    async fn reset(&self, id: DbId) -> Result<bool, StoreError> {
        self.inner.reset(id).await
    }

    async fn update_metadata(&self, id: DbId, metadata: &ReportMetadata) -> Result<(), StoreError> {
        self.inner.update_metadata(id, metadata).await
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        self.inner.list_pending(limit).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: ReportPipeline,
    pub store: Arc<MemoryReportStore>,
    /// Fault injection in front of `store`; the pipeline goes through it.
    pub faults: Arc<FlakyStore>,
    pub cache: Arc<CacheManager>,
    pub compiler: Arc<CountingCompiler>,
    pub charts: Arc<CountingCharts>,
    pub notifier: Arc<RecordingNotifier>,
    pub exporter: Arc<RecordingExporter>,
}

pub struct HarnessBuilder {
    compiler: CountingCompiler,
    narrative: Arc<dyn NarrativeGenerator>,
    notifier: RecordingNotifier,
    config: PipelineConfig,
}

impl HarnessBuilder {
    pub fn compiler(mut self, compiler: CountingCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn narrative(mut self, narrative: impl NarrativeGenerator + 'static) -> Self {
        self.narrative = Arc::new(narrative);
        self
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryReportStore::new());
        let faults = Arc::new(FlakyStore::new(Arc::clone(&store)));
        let cache = Arc::new(CacheManager::new(CacheManagerConfig::default(), None).unwrap());
        let compiler = Arc::new(self.compiler);
        let charts = Arc::new(CountingCharts::default());
        let notifier = Arc::new(self.notifier);
        let exporter = Arc::new(RecordingExporter::default());

        let collaborators = Collaborators {
            compiler: compiler.clone(),
            narrative: self.narrative,
            charts: charts.clone(),
            notifier: notifier.clone(),
            exporter: exporter.clone(),
        };
        let pipeline = ReportPipeline::new(
            faults.clone() as Arc<dyn ReportStore>,
            Arc::clone(&cache),
            collaborators,
            self.config,
        );

        Harness {
            pipeline,
            store,
            faults,
            cache,
            compiler,
            charts,
            notifier,
            exporter,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        compiler: CountingCompiler::new(),
        narrative: Arc::new(OfflineNarrativeGenerator::new()),
        notifier: RecordingNotifier::default(),
        config: PipelineConfig::default(),
    }
}

impl Harness {
    pub async fn report(&self, id: i64) -> Report {
        self.store
            .find_by_id(id)
            .await
            .expect("store read")
            .expect("report exists")
    }
}
