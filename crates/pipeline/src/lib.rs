//! Security report generation pipeline.
//!
//! [`ReportPipeline`] owns the report lifecycle and calls out to the
//! collaborator traits defined here: [`DataCompiler`],
//! [`NarrativeGenerator`], [`ChartGenerator`] and [`ExportService`].
//! Default implementations work offline against an inventory snapshot.

pub mod charts;
pub mod compiler;
pub mod composer;
pub mod config;
pub mod error;
pub mod export;
pub mod narrative;
pub mod orchestrator;
pub mod sections;

pub use charts::{ChartGenerator, DefaultChartGenerator};
pub use compiler::{CompileRequest, DataCompiler, Inventory, SnapshotDataCompiler};
pub use config::PipelineConfig;
pub use error::{ChartError, CompileError, ComposeError, ExportError, NarrativeError, PipelineError};
pub use export::{ExportFormat, ExportService, FileExporter};
pub use narrative::{AnalysisContext, NarrativeGenerator, NarrativeOutput, OfflineNarrativeGenerator};
pub use orchestrator::{Collaborators, GenerationOutcome, ReportPipeline};
pub use sections::SectionResults;
