//! End-to-end generation runs against the in-memory store and stub
//! collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use vigil_core::report::{AnalysisEntry, ReportStatusView};
use vigil_core::status::ReportStatus;
use vigil_events::{BusEvent, EventBus, NotificationEvent, Priority};
use vigil_pipeline::narrative::{ANALYSIS_EXECUTIVE_SUMMARY, ANALYSIS_RISK_ASSESSMENT};
use vigil_pipeline::{ExportFormat, GenerationOutcome, PipelineConfig};

use common::{harness, new_report, CountingCompiler, RecordingNotifier, ScriptedNarrative, CHART_TYPES};

fn short_timeouts() -> PipelineConfig {
    PipelineConfig {
        collaborator_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Test: happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_completes_report_with_all_sections() {
    let h = harness().build();
    let created = h.pipeline.create_report(new_report("Q3 posture")).await.unwrap();
    assert_eq!(created.status, ReportStatus::Pending);

    let outcome = h.pipeline.generate(created.id).await;
    assert_eq!(outcome, GenerationOutcome::Completed);

    let report = h.report(created.id).await;
    assert_eq!(report.status, ReportStatus::Completed);
    assert!(report.generated_at.is_some());
    assert!(report.metadata.error_message.is_none());
    assert!(report.is_consistent());

    let content = report.content.as_ref().expect("content persisted");
    assert_eq!(content.title, "Q3 posture");
    assert_eq!(content.summary.asset_count, 2);
    assert_eq!(content.summary.vulnerability_count, 3);
    assert_eq!(content.summary.severity_counts.critical, 1);
    assert!(!content.templated_summary);
    assert_eq!(content.sections.len(), 2);
    assert_eq!(content.charts.len(), CHART_TYPES.len());

    assert_eq!(report.ai_analysis.len(), 3);
    assert!(report.ai_analysis.values().all(|entry| !entry.is_error()));
    for chart_type in CHART_TYPES {
        assert!(report.charts_data.contains_key(chart_type), "{chart_type}");
    }

    assert_eq!(
        h.pipeline.status(created.id).await,
        ReportStatusView {
            status: Some(ReportStatus::Completed),
            progress: 100,
            error_message: None,
            generated_at: report.generated_at,
        }
    );
}

#[tokio::test]
async fn narratives_are_normalized_with_model_and_request_id() {
    let h = harness().build();
    let id = h.pipeline.create_report(new_report("Normalized")).await.unwrap().id;
    h.pipeline.generate(id).await;

    let report = h.report(id).await;
    let section = assert_matches!(
        report.ai_analysis.get(ANALYSIS_EXECUTIVE_SUMMARY),
        Some(AnalysisEntry::Narrative(section)) => section
    );
    assert_eq!(section.model, "offline-template");
    assert!(!section.request_id.is_empty());
    assert_eq!(
        report.content.unwrap().executive_summary,
        section.markdown
    );
}

#[tokio::test]
async fn sequential_sections_produce_the_same_report_shape() {
    let h = harness()
        .config(PipelineConfig {
            parallel_sections: false,
            ..Default::default()
        })
        .build();
    let id = h.pipeline.create_report(new_report("Sequential")).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);
    let report = h.report(id).await;
    assert_eq!(report.ai_analysis.len(), 3);
    assert_eq!(report.charts_data.len(), CHART_TYPES.len());
}

#[tokio::test]
async fn report_without_optional_sections_uses_templated_summary() {
    let h = harness().build();
    let mut input = new_report("Bare");
    input.metadata.include_ai_analysis = false;
    input.metadata.include_charts = false;
    let id = h.pipeline.create_report(input).await.unwrap().id;

    h.pipeline.generate(id).await;

    let report = h.report(id).await;
    let content = report.content.unwrap();
    assert!(content.templated_summary);
    assert!(content.executive_summary.contains("2 assets"));
    assert!(report.ai_analysis.is_empty());
    assert!(report.charts_data.is_empty());
    assert_eq!(h.charts.builds(), 0);
}

// ---------------------------------------------------------------------------
// Test: fatal and degraded failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn compiler_failure_marks_report_failed() {
    let h = harness().compiler(CountingCompiler::failing(1)).build();
    let id = h.pipeline.create_report(new_report("Broken source")).await.unwrap().id;

    let outcome = h.pipeline.generate(id).await;
    assert_matches!(outcome, GenerationOutcome::Failed { ref error } if error.contains("inventory service unavailable"));

    let report = h.report(id).await;
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.content.is_none());
    let message = report.metadata.error_message.clone().unwrap();
    assert!(!message.is_empty());

    let view = h.pipeline.status(id).await;
    assert_eq!(view.progress, 0);
    assert_eq!(view.error_message.as_deref(), Some(message.as_str()));

    let failed = h.notifier.find(NotificationEvent::ReportFailed).unwrap();
    assert_eq!(failed.priority, Priority::High);
    assert_eq!(failed.recipient.as_deref(), Some("secops@example.com"));
    assert_eq!(failed.field("error_message").unwrap(), &serde_json::json!(message));
    assert!(h.notifier.find(NotificationEvent::ReportCompleted).is_none());
}

#[tokio::test]
async fn compiler_timeout_fails_report() {
    let h = harness()
        .compiler(CountingCompiler::slow(Duration::from_secs(30)))
        .config(short_timeouts())
        .build();
    let id = h.pipeline.create_report(new_report("Slow source")).await.unwrap().id;

    let outcome = h.pipeline.generate(id).await;
    assert_matches!(outcome, GenerationOutcome::Failed { ref error } if error.contains("timed out"));
    assert_eq!(h.report(id).await.status, ReportStatus::Failed);
}

#[tokio::test]
async fn one_failing_narrative_does_not_abort_the_others() {
    let h = harness()
        .narrative(ScriptedNarrative::failing(&[ANALYSIS_RISK_ASSESSMENT]))
        .build();
    let id = h.pipeline.create_report(new_report("Partial")).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);

    let report = h.report(id).await;
    assert_eq!(report.status, ReportStatus::Completed);
    assert_matches!(
        report.ai_analysis.get(ANALYSIS_RISK_ASSESSMENT),
        Some(AnalysisEntry::Error { error, .. }) if error.contains("model overloaded")
    );
    let successes = report
        .ai_analysis
        .values()
        .filter(|entry| entry.narrative().is_some())
        .count();
    assert_eq!(successes, 2);

    let content = report.content.unwrap();
    assert!(content.sections.iter().all(|s| s.key != ANALYSIS_RISK_ASSESSMENT));
}

#[tokio::test]
async fn stalled_narrative_degrades_to_template() {
    let h = harness()
        .narrative(ScriptedNarrative::stalling(&[ANALYSIS_EXECUTIVE_SUMMARY]))
        .config(short_timeouts())
        .build();
    let id = h.pipeline.create_report(new_report("Stalled")).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);

    let report = h.report(id).await;
    assert_matches!(
        report.ai_analysis.get(ANALYSIS_EXECUTIVE_SUMMARY),
        Some(AnalysisEntry::Error { error, .. }) if error.contains("timed out")
    );
    assert!(report.content.unwrap().templated_summary);
}

#[tokio::test]
async fn unknown_chart_type_is_omitted() {
    let h = harness().build();
    let mut input = new_report("Radar");
    input.metadata.chart_types.push("radar".to_string());
    let id = h.pipeline.create_report(input).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);

    let report = h.report(id).await;
    assert!(!report.charts_data.contains_key("radar"));
    assert_eq!(report.charts_data.len(), CHART_TYPES.len());
}

#[tokio::test]
async fn oversized_composition_falls_back_to_base_content() {
    let h = harness()
        .config(PipelineConfig {
            max_content_bytes: 64,
            ..Default::default()
        })
        .build();
    let id = h.pipeline.create_report(new_report("Huge")).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);

    let report = h.report(id).await;
    let content = report.content.unwrap();
    assert!(content.templated_summary);
    assert!(content.sections.is_empty());
    assert!(content.charts.is_empty());
    // Raw section outputs are still stored.
    assert_eq!(report.ai_analysis.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dataset_is_compiled_once_across_generate_and_regenerate() {
    let h = harness().build();
    let id = h.pipeline.create_report(new_report("Reuse")).await.unwrap().id;

    h.pipeline.generate(id).await;
    let outcome = h.pipeline.regenerate(id).await.unwrap();

    assert_eq!(outcome, GenerationOutcome::Completed);
    assert_eq!(h.compiler.calls(), 1);
    assert_eq!(h.charts.builds(), CHART_TYPES.len());
}

#[tokio::test]
async fn invalidated_cache_forces_recompile() {
    let h = harness().build();
    let id = h.pipeline.create_report(new_report("Edited scope")).await.unwrap().id;

    h.pipeline.generate(id).await;
    assert!(h.pipeline.invalidate_cache(id).await >= 1 + CHART_TYPES.len());
    h.pipeline.regenerate(id).await.unwrap();

    assert_eq!(h.compiler.calls(), 2);
    assert_eq!(h.charts.builds(), 2 * CHART_TYPES.len());
}

#[tokio::test]
async fn datasets_are_cached_per_report() {
    let h = harness().build();
    let first = h.pipeline.create_report(new_report("First")).await.unwrap().id;
    let second = h.pipeline.create_report(new_report("Second")).await.unwrap().id;

    h.pipeline.generate(first).await;
    h.pipeline.generate(second).await;

    assert_eq!(h.compiler.calls(), 2);
    assert_eq!(h.cache.stats().reports.entries, 2);
}

// ---------------------------------------------------------------------------
// Test: side effects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_and_critical_notifications_are_sent() {
    let h = harness().build();
    let id = h.pipeline.create_report(new_report("Alerts")).await.unwrap().id;
    h.pipeline.generate(id).await;

    assert_eq!(
        h.notifier.events(),
        vec![
            NotificationEvent::ReportCreated,
            NotificationEvent::ReportCompleted,
            NotificationEvent::CriticalVulnerabilities,
        ]
    );

    let completed = h.notifier.find(NotificationEvent::ReportCompleted).unwrap();
    assert_eq!(completed.recipient.as_deref(), Some("secops@example.com"));
    assert_eq!(completed.field("title").unwrap(), "Alerts");
    assert_eq!(completed.field("critical_count").unwrap(), 1);
    assert_eq!(
        completed.field("url").unwrap(),
        &serde_json::json!(format!("http://localhost:3000/reports/{id}"))
    );

    let critical = h.notifier.find(NotificationEvent::CriticalVulnerabilities).unwrap();
    assert_eq!(critical.priority, Priority::Critical);
    assert_eq!(
        critical.field("findings").unwrap(),
        &serde_json::json!(["Remote code execution in web framework"])
    );
}

#[tokio::test]
async fn critical_alert_is_sent_even_without_completion_notification() {
    let h = harness().build();
    let mut input = new_report("Quiet");
    input.metadata.notify_completion = false;
    let id = h.pipeline.create_report(input).await.unwrap().id;
    h.pipeline.generate(id).await;

    assert!(h.notifier.find(NotificationEvent::ReportCompleted).is_none());
    assert!(h.notifier.find(NotificationEvent::CriticalVulnerabilities).is_some());
}

#[tokio::test]
async fn notification_failures_do_not_affect_the_report() {
    let h = harness().notifier(RecordingNotifier::unavailable()).build();
    let id = h.pipeline.create_report(new_report("Offline mail")).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);
    assert_eq!(h.report(id).await.status, ReportStatus::Completed);
    assert_eq!(h.notifier.sent().len(), 3);
}

#[tokio::test]
async fn auto_export_records_artifact_location() {
    let h = harness().build();
    let mut input = new_report("Exported");
    input.metadata.auto_export = true;
    input.metadata.export_format = Some("HTML".to_string());
    let id = h.pipeline.create_report(input).await.unwrap().id;

    h.pipeline.generate(id).await;

    assert_eq!(h.exporter.exports(), vec![(id, ExportFormat::Html)]);
    let report = h.report(id).await;
    assert_eq!(
        report.metadata.export_location.as_deref(),
        Some(format!("memory://report_{id}.html").as_str())
    );
    assert!(report.metadata.exported_at.is_some());
    assert_eq!(report.status, ReportStatus::Completed);
}

#[tokio::test]
async fn auto_export_defaults_to_json() {
    let h = harness().build();
    let mut input = new_report("Default format");
    input.metadata.auto_export = true;
    let id = h.pipeline.create_report(input).await.unwrap().id;

    h.pipeline.generate(id).await;

    assert_eq!(h.exporter.exports(), vec![(id, ExportFormat::Json)]);
}

#[tokio::test]
async fn unsupported_export_format_is_logged_only() {
    let h = harness().build();
    let mut input = new_report("Spreadsheet");
    input.metadata.auto_export = true;
    input.metadata.export_format = Some("xlsx".to_string());
    let id = h.pipeline.create_report(input).await.unwrap().id;

    assert_eq!(h.pipeline.generate(id).await, GenerationOutcome::Completed);

    let report = h.report(id).await;
    assert!(h.exporter.exports().is_empty());
    assert!(report.metadata.export_location.is_none());
    assert_eq!(report.status, ReportStatus::Completed);
}

#[tokio::test]
async fn lifecycle_transitions_are_published() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let h = harness().build();
    let pipeline = h.pipeline.with_event_bus(Arc::clone(&bus));

    let id = pipeline.create_report(new_report("Observed")).await.unwrap().id;
    pipeline.generate(id).await;

    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let BusEvent::Lifecycle(event) = event {
            assert_eq!(event.report_id, id);
            statuses.push((event.status, event.progress));
        }
    }
    assert_eq!(
        statuses,
        vec![
            (ReportStatus::Pending, 0),
            (ReportStatus::Generating, 50),
            (ReportStatus::Completed, 100),
        ]
    );
}
