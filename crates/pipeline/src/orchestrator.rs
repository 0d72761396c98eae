//! Report generation orchestrator.
//!
//! [`ReportPipeline`] drives one report through its lifecycle:
//!
//! ```text
//! Pending -> Generating -> Completed
//!                       \-> Failed
//! Completed | Failed -> Pending   (regenerate)
//! ```
//!
//! A generation run compiles (or reuses) the dataset, builds the base
//! content, fans out to the narrative and chart generators, composes the
//! final document and persists it. Only dataset compilation and
//! persistence can fail a report; narrative, chart, composition, export
//! and notification failures are contained at the step that produced them.
//!
//! All collaborators are injected, so any number of pipelines can share
//! one store and one cache manager.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vigil_cache::key::{chart_key, PREFIX_SUMMARY};
use vigil_cache::CacheManager;
use vigil_core::dataset::{Dataset, Severity};
use vigil_core::error::CoreError;
use vigil_core::report::{
    AnalysisEntry, ChartPayload, ContentSummary, NarrativeSection, NewReport, Report,
    ReportStatusView,
};
use vigil_core::status::ReportStatus;
use vigil_core::types::DbId;
use vigil_db::{CompletedReport, ReportStore, StoreError};
use vigil_events::{
    EventBus, LifecycleEvent, Notification, NotificationEvent, NotificationService,
};

use crate::charts::ChartGenerator;
use crate::compiler::{CompileRequest, DataCompiler};
use crate::composer::{base_content, compose};
use crate::config::PipelineConfig;
use crate::error::{ChartError, CompileError, ExportError, NarrativeError, PipelineError};
use crate::export::{ExportFormat, ExportService};
use crate::narrative::{normalize, AnalysisContext, NarrativeGenerator};
use crate::sections::SectionResults;

/// Number of critical findings listed in a critical-vulnerability alert.
const CRITICAL_ALERT_LISTING: usize = 5;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the pipeline calls during a run.
#[derive(Clone)]
pub struct Collaborators {
    pub compiler: Arc<dyn DataCompiler>,
    pub narrative: Arc<dyn NarrativeGenerator>,
    pub charts: Arc<dyn ChartGenerator>,
    pub notifier: Arc<dyn NotificationService>,
    pub exporter: Arc<dyn ExportService>,
}

/// How a call to [`ReportPipeline::generate`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    /// The report was marked `Failed` with this message.
    Failed { error: String },
    /// No report with that id.
    NotFound,
    /// The store failed before this run claimed the report. The row was
    /// left as it was.
    Unavailable { error: String },
    /// The report was not `Pending`, so another run owns it or it is done.
    Skipped(ReportStatus),
}

// ---------------------------------------------------------------------------
// ReportPipeline
// ---------------------------------------------------------------------------

pub struct ReportPipeline {
    store: Arc<dyn ReportStore>,
    cache: Arc<CacheManager>,
    collaborators: Collaborators,
    bus: Option<Arc<EventBus>>,
    config: PipelineConfig,
}

impl ReportPipeline {
    pub fn new(
        store: Arc<dyn ReportStore>,
        cache: Arc<CacheManager>,
        collaborators: Collaborators,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            cache,
            collaborators,
            bus: None,
            config,
        }
    }

    /// Publish lifecycle transitions on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Insert a new `Pending` report and announce it.
    pub async fn create_report(&self, input: NewReport) -> Result<Report, PipelineError> {
        if input.title.trim().is_empty() {
            return Err(CoreError::Validation("report title must not be empty".into()).into());
        }
        if let (Some(start), Some(end)) = (input.period_start, input.period_end) {
            if start > end {
                return Err(CoreError::Validation(format!(
                    "period_start {start} is after period_end {end}"
                ))
                .into());
            }
        }

        let report = self.store.create(input).await?;
        tracing::info!(report_id = report.id, title = %report.title, "Report created");
        self.publish_lifecycle(report.id, ReportStatus::Pending);

        let notification = Notification::new(NotificationEvent::ReportCreated)
            .with_field("report_id", report.id)
            .with_field("title", report.title.clone())
            .with_field("report_type", report.report_type.clone())
            .with_field("url", self.config.report_url(report.id))
            .with_field("created_at", report.created_at.to_rfc3339())
            .with_recipient(report.metadata.notification_email.clone());
        self.notify(report.id, &notification).await;

        Ok(report)
    }

    /// Run the generation pipeline for one report.
    ///
    /// Never returns an error: a missing report is a logged no-op, a
    /// report that is not `Pending` is skipped, and any failure after the
    /// `Pending -> Generating` claim marks the report `Failed`. Store errors
    /// before the claim leave the row untouched.
    pub async fn generate(&self, report_id: DbId) -> GenerationOutcome {
        let mut report = match self.store.find_by_id(report_id).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                tracing::warn!(report_id, "Report not found, nothing to generate");
                return GenerationOutcome::NotFound;
            }
            Err(e) => return unavailable(report_id, e),
        };

        match self.store.mark_generating(report_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    report_id,
                    status = %report.status,
                    "Report is not pending, skipping generation"
                );
                return GenerationOutcome::Skipped(report.status);
            }
            Err(e) => return unavailable(report_id, e),
        }
        report.status = ReportStatus::Generating;
        self.publish_lifecycle(report_id, ReportStatus::Generating);
        tracing::info!(report_id, title = %report.title, "Report generation started");

        let started = std::time::Instant::now();
        match self.run(&report).await {
            Ok((completed, dataset)) => {
                tracing::info!(
                    report_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    narratives = completed.ai_analysis.len(),
                    charts = completed.charts_data.len(),
                    "Report generation completed"
                );
                self.publish_lifecycle(report_id, ReportStatus::Completed);
                self.after_completion(completed, &dataset).await;
                GenerationOutcome::Completed
            }
            Err(e) => self.fail(&report, e).await,
        }
    }

    /// Reset a terminal report to `Pending` and generate it again.
    ///
    /// Cached datasets are kept, so a regeneration within the dataset TTL
    /// does not recompile.
    pub async fn regenerate(&self, report_id: DbId) -> Result<GenerationOutcome, PipelineError> {
        let report = self
            .store
            .find_by_id(report_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "report",
                id: report_id,
            })?;

        let invalid = CoreError::InvalidTransition {
            id: report_id,
            from: report.status.as_str(),
            to: ReportStatus::Pending.as_str(),
        };
        if !report.status.can_transition_to(ReportStatus::Pending) {
            return Err(invalid.into());
        }
        if !self.store.reset(report_id).await? {
            // Lost a race with another writer.
            return Err(invalid.into());
        }

        tracing::info!(report_id, previous = %report.status, "Report reset for regeneration");
        self.publish_lifecycle(report_id, ReportStatus::Pending);
        Ok(self.generate(report_id).await)
    }

    /// Drop every cached artifact derived from the report.
    pub async fn invalidate_cache(&self, report_id: DbId) -> usize {
        self.cache.invalidate_report(report_id).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current status, progress and error of a report. Never fails.
    pub async fn status(&self, report_id: DbId) -> ReportStatusView {
        match self.store.find_by_id(report_id).await {
            Ok(Some(report)) => ReportStatusView::from(&report),
            Ok(None) => ReportStatusView::unavailable(),
            Err(e) => {
                tracing::warn!(report_id, error = %e, "Status lookup failed");
                ReportStatusView::unavailable()
            }
        }
    }

    /// Headline numbers of a completed report, memoized in the query store.
    ///
    /// Returns `None` while the report has no content.
    pub async fn summary(&self, report_id: DbId) -> Result<Option<ContentSummary>, PipelineError> {
        let key = format!("{PREFIX_SUMMARY}_{report_id}");
        if let Some(cached) = self.cache.queries().get(&key) {
            match serde_json::from_value::<ContentSummary>((*cached).clone()) {
                Ok(summary) => return Ok(Some(summary)),
                Err(e) => {
                    tracing::warn!(report_id, error = %e, "Discarding unreadable cached summary");
                    self.cache.queries().delete(&key);
                }
            }
        }

        let Some(report) = self.store.find_by_id(report_id).await? else {
            return Ok(None);
        };
        let Some(content) = report.content else {
            return Ok(None);
        };

        match serde_json::to_value(&content.summary) {
            Ok(value) => {
                self.cache.queries().set(key, value, None);
            }
            Err(e) => tracing::warn!(report_id, error = %e, "Summary not cached"),
        }
        Ok(Some(content.summary))
    }

    // -----------------------------------------------------------------------
    // Generation steps
    // -----------------------------------------------------------------------

    /// Dataset, sections, composition and persistence. Returns the
    /// completed report and the dataset it was built from.
    async fn run(&self, report: &Report) -> Result<(Report, Dataset), PipelineError> {
        let dataset = self.load_dataset(report).await?;
        let base = base_content(report, &dataset);

        let narratives = self.generate_narratives(report, &dataset).await;
        let charts = self.generate_charts(report, &dataset).await;

        let now = Utc::now();
        let (narratives, narrative_failures) = narratives.into_parts();
        let (charts, _) = charts.into_parts();

        let content = match compose(&base, &narratives, &charts, self.config.max_content_bytes) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(report_id = report.id, error = %e, "Composition failed, keeping base content");
                base
            }
        };

        let mut ai_analysis: BTreeMap<String, AnalysisEntry> = narratives
            .into_iter()
            .map(|(key, section)| (key, AnalysisEntry::Narrative(section)))
            .collect();
        for (key, error) in narrative_failures {
            ai_analysis.insert(
                key,
                AnalysisEntry::Error {
                    error: error.to_string(),
                    failed_at: now,
                },
            );
        }

        let outcome = CompletedReport {
            content,
            charts_data: charts,
            ai_analysis,
            generated_at: now,
        };
        if !self.store.complete(report.id, &outcome).await? {
            return Err(PipelineError::Vanished(report.id));
        }
        self.cache.invalidate_summary(report.id);

        let mut completed = report.clone();
        completed.status = ReportStatus::Completed;
        completed.content = Some(outcome.content);
        completed.charts_data = outcome.charts_data;
        completed.ai_analysis = outcome.ai_analysis;
        completed.generated_at = Some(outcome.generated_at);
        completed.metadata.error_message = None;
        completed.updated_at = now;
        Ok((completed, dataset))
    }

    /// Reuse the cached dataset for these inputs or compile a fresh one.
    async fn load_dataset(&self, report: &Report) -> Result<Dataset, CompileError> {
        let request = CompileRequest::from_report(report);
        if let (Some(start), Some(end)) = (request.period_start, request.period_end) {
            if start > end {
                return Err(CompileError::InvalidPeriod { start, end });
            }
        }

        let key = request.cache_key(report.id);
        if let Some(cached) = self.cache.reports().get(&key).await {
            match serde_json::from_value::<Dataset>((*cached).clone()) {
                Ok(dataset) => {
                    tracing::debug!(report_id = report.id, "Dataset cache hit");
                    return Ok(dataset);
                }
                Err(e) => {
                    tracing::warn!(report_id = report.id, error = %e, "Cached dataset unreadable, recompiling");
                }
            }
        }

        let dataset = self
            .bounded(
                self.collaborators.compiler.compile(&request),
                CompileError::Timeout,
            )
            .await?;
        tracing::debug!(
            report_id = report.id,
            assets = dataset.assets.len(),
            vulnerabilities = dataset.vulnerabilities.len(),
            "Dataset compiled"
        );

        match serde_json::to_value(&dataset) {
            Ok(value) => {
                self.cache
                    .reports()
                    .set(key, value, self.config.dataset_ttl)
                    .await;
            }
            Err(e) => tracing::warn!(report_id = report.id, error = %e, "Dataset not cached"),
        }
        Ok(dataset)
    }

    async fn generate_narratives(
        &self,
        report: &Report,
        dataset: &Dataset,
    ) -> SectionResults<NarrativeSection, NarrativeError> {
        let types = distinct(report.metadata.requested_analyses());
        if types.is_empty() {
            return SectionResults::new();
        }

        let context = AnalysisContext::from_dataset(
            &report.title,
            dataset,
            report.period_start,
            report.period_end,
            report.detail_level,
        );
        let results = self
            .per_type(types, |analysis_type| {
                self.narrative_section(analysis_type, &context, &report.report_type)
            })
            .await;

        for (analysis_type, error) in results.failures() {
            tracing::warn!(report_id = report.id, analysis_type, error = %error, "Narrative generation failed");
        }
        results
    }

    async fn narrative_section(
        &self,
        analysis_type: String,
        context: &AnalysisContext,
        report_type: &str,
    ) -> Result<NarrativeSection, NarrativeError> {
        let generator = &self.collaborators.narrative;
        let output = self
            .bounded(
                generator.generate(&analysis_type, context, report_type),
                NarrativeError::Timeout,
            )
            .await?;
        normalize(output, generator.model_name(), Utc::now())
    }

    async fn generate_charts(
        &self,
        report: &Report,
        dataset: &Dataset,
    ) -> SectionResults<ChartPayload, ChartError> {
        let types = distinct(report.metadata.requested_charts());
        if types.is_empty() {
            return SectionResults::new();
        }

        let results = self
            .per_type(types, |chart_type| self.chart(chart_type, report.id, dataset))
            .await;

        for (chart_type, error) in results.failures() {
            tracing::warn!(report_id = report.id, chart_type, error = %error, "Chart generation failed");
        }
        results
    }

    async fn chart(
        &self,
        chart_type: String,
        report_id: DbId,
        dataset: &Dataset,
    ) -> Result<ChartPayload, ChartError> {
        let key = chart_key(&chart_type, report_id);
        if let Some(cached) = self.cache.charts().get(&key).await {
            match serde_json::from_value::<ChartPayload>((*cached).clone()) {
                Ok(payload) => {
                    tracing::debug!(report_id, chart_type = %chart_type, "Chart cache hit");
                    return Ok(payload);
                }
                Err(e) => {
                    tracing::warn!(report_id, chart_type = %chart_type, error = %e, "Cached chart unreadable, rebuilding");
                }
            }
        }

        let payload = self
            .bounded(
                self.collaborators.charts.build(&chart_type, dataset),
                ChartError::Timeout,
            )
            .await?;
        match serde_json::to_value(&payload) {
            Ok(value) => {
                self.cache.charts().set(key, value, self.config.chart_ttl).await;
            }
            Err(e) => tracing::warn!(report_id, chart_type = %chart_type, error = %e, "Chart not cached"),
        }
        Ok(payload)
    }

    /// Run `step` once per type, concurrently when `parallel_sections` is
    /// set. Each type's outcome is recorded independently.
    async fn per_type<T, E, F, Fut>(&self, types: Vec<String>, step: F) -> SectionResults<T, E>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.config.parallel_sections {
            futures::future::join_all(types.into_iter().map(|key| {
                let fut = step(key.clone());
                async move { (key, fut.await) }
            }))
            .await
            .into_iter()
            .collect()
        } else {
            let mut results = SectionResults::new();
            for key in types {
                let outcome = step(key.clone()).await;
                results.insert(key, outcome);
            }
            results
        }
    }

    /// Bound a collaborator call by the configured timeout.
    async fn bounded<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>>,
        on_timeout: impl FnOnce(Duration) -> E,
    ) -> Result<T, E> {
        let limit = self.config.collaborator_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit)),
        }
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    /// Notifications and export after a successful run. Nothing here can
    /// change the report's status.
    async fn after_completion(&self, mut report: Report, dataset: &Dataset) {
        if report.metadata.notify_completion {
            let notification = self.completion_notification(&report);
            self.notify(report.id, &notification).await;
        }

        if dataset.has_critical() {
            let notification = self.critical_notification(&report, dataset);
            self.notify(report.id, &notification).await;
        }

        if report.metadata.auto_export {
            match self.export(&report).await {
                Ok(location) => {
                    report.metadata.export_location = Some(location);
                    report.metadata.exported_at = Some(Utc::now());
                    if let Err(e) = self.store.update_metadata(report.id, &report.metadata).await {
                        tracing::warn!(report_id = report.id, error = %e, "Failed to record export location");
                    }
                }
                Err(e) => {
                    tracing::warn!(report_id = report.id, error = %e, "Report export failed");
                }
            }
        }
    }

    async fn export(&self, report: &Report) -> Result<String, ExportError> {
        let format: ExportFormat = report.metadata.export_format().parse()?;
        self.bounded(
            self.collaborators.exporter.export(report, format),
            ExportError::Timeout,
        )
        .await
    }

    fn completion_notification(&self, report: &Report) -> Notification {
        let mut notification = Notification::new(NotificationEvent::ReportCompleted)
            .with_field("report_id", report.id)
            .with_field("title", report.title.clone())
            .with_field("url", self.config.report_url(report.id))
            .with_recipient(report.metadata.notification_email.clone());

        if let Some(generated_at) = report.generated_at {
            notification = notification.with_field("generated_at", generated_at.to_rfc3339());
        }
        if let Some(content) = &report.content {
            let summary = &content.summary;
            notification = notification
                .with_field("asset_count", summary.asset_count)
                .with_field("vulnerability_count", summary.vulnerability_count)
                .with_field("critical_count", summary.severity_counts.critical)
                .with_field("high_count", summary.severity_counts.high)
                .with_field("risk_score", summary.risk_score);
        }
        notification
    }

    fn critical_notification(&self, report: &Report, dataset: &Dataset) -> Notification {
        let critical: Vec<serde_json::Value> = dataset
            .top_vulnerabilities(CRITICAL_ALERT_LISTING)
            .into_iter()
            .filter(|v| v.severity == Severity::Critical)
            .map(|v| serde_json::Value::String(v.title.clone()))
            .collect();

        Notification::new(NotificationEvent::CriticalVulnerabilities)
            .with_field("report_id", report.id)
            .with_field("title", report.title.clone())
            .with_field("url", self.config.report_url(report.id))
            .with_field("critical_count", dataset.risk.severity_counts.critical)
            .with_field("findings", critical)
            .with_recipient(report.metadata.notification_email.clone())
    }

    /// Mark the report failed and send a best-effort failure notification.
    /// Only called once this run holds the `Generating` claim.
    async fn fail(&self, report: &Report, error: PipelineError) -> GenerationOutcome {
        let report_id = report.id;
        let message = error.to_string();
        tracing::error!(report_id, error = %message, "Report generation failed");

        match self.store.fail(report_id, &message).await {
            Ok(true) => self.publish_lifecycle(report_id, ReportStatus::Failed),
            Ok(false) => {
                tracing::warn!(report_id, "Report was not in a failable state");
            }
            Err(e) => {
                tracing::error!(report_id, error = %e, "Failed to persist report failure");
            }
        }

        let notification = Notification::new(NotificationEvent::ReportFailed)
            .with_field("report_id", report_id)
            .with_field("title", report.title.clone())
            .with_field("url", self.config.report_url(report_id))
            .with_field("error_message", message.clone())
            .with_field("failed_at", Utc::now().to_rfc3339())
            .with_recipient(report.metadata.notification_email.clone());
        self.notify(report_id, &notification).await;

        GenerationOutcome::Failed { error: message }
    }

    async fn notify(&self, report_id: DbId, notification: &Notification) {
        if let Err(e) = self.collaborators.notifier.notify(notification).await {
            tracing::warn!(
                report_id,
                event = %notification.event,
                error = %e,
                "Notification not delivered"
            );
        }
    }

    fn publish_lifecycle(&self, report_id: DbId, status: ReportStatus) {
        if let Some(bus) = &self.bus {
            bus.publish_lifecycle(LifecycleEvent::new(report_id, status));
        }
    }
}

/// Requested type tags with blanks and repeats removed, in request order.
fn unavailable(report_id: DbId, error: StoreError) -> GenerationOutcome {
    tracing::error!(report_id, error = %error, "Report store unavailable, generation not started");
    GenerationOutcome::Unavailable {
        error: error.to_string(),
    }
}

fn distinct(types: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(types.len());
    for t in types {
        let t = t.trim();
        if !t.is_empty() && !out.iter().any(|seen| seen == t) {
            out.push(t.to_string());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
