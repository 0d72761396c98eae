//! Error types for the generation pipeline.
//!
//! Only [`CompileError`] and persistence failures are fatal to a report.
//! Narrative, chart, composition and export errors are contained at the
//! step that produced them.

use std::time::Duration;

use vigil_core::error::CoreError;
use vigil_core::types::{DbId, Timestamp};
use vigil_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Data source error: {0}")]
    Source(String),

    #[error("Inventory snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inventory snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid reporting period: start {start} is after end {end}")]
    InvalidPeriod { start: Timestamp, end: Timestamp },

    #[error("Data compilation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("Unsupported analysis type: {0}")]
    UnsupportedType(String),

    #[error("Narrative backend error: {0}")]
    Backend(String),

    #[error("Narrative backend returned empty text")]
    Empty,

    #[error("Narrative generation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Unknown chart type: {0}")]
    UnknownType(String),

    #[error("Chart generation failed: {0}")]
    Generation(String),

    #[error("Chart generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cached chart payload is invalid: {0}")]
    Cached(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Composed content is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Composed content could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Report {0} has no content to export")]
    NoContent(DbId),

    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by [`ReportPipeline`](crate::ReportPipeline) operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Report {0} disappeared during generation")]
    Vanished(DbId),
}
