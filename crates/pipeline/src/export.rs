//! Report export.
//!
//! [`ExportService`] receives a read-only snapshot of a completed report
//! and returns where the artifact was written. [`FileExporter`] writes
//! `json` and `html` artifacts to a directory; `pdf` and `docx` need an
//! external rendering backend and are rejected.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use vigil_core::report::{Report, ReportContent};

use crate::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Pdf,
    Html,
    Docx,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Docx => "docx",
            Self::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "html" => Ok(Self::Html),
            "docx" => Ok(Self::Docx),
            "json" => Ok(Self::Json),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ExportService: Send + Sync {
    /// Write `report` in `format` and return the artifact location.
    async fn export(&self, report: &Report, format: ExportFormat) -> Result<String, ExportError>;
}

// ---------------------------------------------------------------------------
// FileExporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(report: &Report, format: ExportFormat) -> String {
        let stamp = report
            .generated_at
            .unwrap_or(report.updated_at)
            .format("%Y%m%dT%H%M%SZ");
        format!("report_{}_{}.{}", report.id, stamp, format.extension())
    }
}

#[async_trait]
impl ExportService for FileExporter {
    async fn export(&self, report: &Report, format: ExportFormat) -> Result<String, ExportError> {
        let content = report.content.as_ref().ok_or(ExportError::NoContent(report.id))?;

        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec_pretty(report)?,
            ExportFormat::Html => render_html(content).into_bytes(),
            ExportFormat::Pdf | ExportFormat::Docx => {
                return Err(ExportError::UnsupportedFormat(format.to_string()));
            }
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(report, format));
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!(
            report_id = report.id,
            format = %format,
            path = %path.display(),
            bytes = bytes.len(),
            "Report exported"
        );
        Ok(path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// HTML rendering
// ---------------------------------------------------------------------------

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Minimal standalone HTML document. Markdown is shown preformatted.
pub fn render_html(content: &ReportContent) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\n\
         <h1>{title}</h1>\n<h2>Executive Summary</h2>\n<pre>{summary}</pre>\n",
        title = escape_html(&content.title),
        summary = escape_html(&content.executive_summary),
    );

    for section in &content.sections {
        html.push_str(&format!(
            "<h2>{}</h2>\n<pre>{}</pre>\n",
            escape_html(&section.title),
            escape_html(&section.markdown)
        ));
    }

    if !content.key_findings.is_empty() {
        html.push_str("<h2>Key Findings</h2>\n<table>\n<tr><th>Severity</th><th>Title</th><th>CVSS</th><th>CVE</th></tr>\n");
        for finding in &content.key_findings {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                finding.severity.label(),
                escape_html(&finding.title),
                finding.cvss_score.map(|s| format!("{s:.1}")).unwrap_or_default(),
                escape_html(finding.cve_id.as_deref().unwrap_or("")),
            ));
        }
        html.push_str("</table>\n");
    }

    if !content.charts.is_empty() {
        html.push_str("<h2>Charts</h2>\n<ul>\n");
        for chart in &content.charts {
            html.push_str(&format!("<li>{}</li>\n", escape_html(&chart.title)));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body></html>\n");
    html
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use vigil_core::report::NewReport;

    fn completed_report() -> Report {
        let now = Utc::now();
        let mut report = Report::from_new(
            8,
            NewReport {
                title: "Ops <Q2>".into(),
                ..Default::default()
            },
            now,
        );
        report.content = Some(ReportContent {
            title: report.title.clone(),
            executive_summary: "All good & calm".into(),
            ..Default::default()
        });
        report.generated_at = Some(now);
        report
    }

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!(" json ".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_matches!("xlsx".parse::<ExportFormat>(), Err(ExportError::UnsupportedFormat(_)));
    }

    #[test]
    fn html_is_escaped() {
        let html = render_html(completed_report().content.as_ref().unwrap());
        assert!(html.contains("<h1>Ops &lt;Q2&gt;</h1>"));
        assert!(html.contains("All good &amp; calm"));
    }

    #[tokio::test]
    async fn writes_json_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path().join("nested"));

        let location = exporter
            .export(&completed_report(), ExportFormat::Json)
            .await
            .unwrap();

        assert!(location.ends_with(".json"));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&location).unwrap()).unwrap();
        assert_eq!(written["id"], 8);
    }

    #[tokio::test]
    async fn writes_html_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path());
        let location = exporter
            .export(&completed_report(), ExportFormat::Html)
            .await
            .unwrap();
        assert!(std::fs::read_to_string(location).unwrap().starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn rejects_renderer_formats_and_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = FileExporter::new(dir.path());

        assert_matches!(
            exporter.export(&completed_report(), ExportFormat::Pdf).await,
            Err(ExportError::UnsupportedFormat(f)) if f == "pdf"
        );

        let mut empty = completed_report();
        empty.content = None;
        assert_matches!(
            exporter.export(&empty, ExportFormat::Json).await,
            Err(ExportError::NoContent(8))
        );
    }
}
