//! Output module for validation results
//!
//! This module handles:
//! - Aggregating findings and telemetry into a [`Report`]
//! - Rendering reports as text or JSON
//! - Streaming progress (log lines or porcelain JSON-patch)

mod json;
mod progress;
mod report;
mod text;

pub use json::format_json_report;
pub use progress::{Progress, ProgressBar};
pub use report::{
    Counts, NetworkSummary, PropertyPresence, PropertyUsage, Report, ResultAggregator,
};
pub use text::format_text_report;

use crate::config::{OutputConfig, OutputFormat};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Renders a report in the configured format
pub fn render_report(report: &Report, config: &OutputConfig) -> OutputResult<String> {
    match config.format {
        OutputFormat::Text => Ok(format_text_report(report, config.compact)),
        OutputFormat::Json => format_json_report(report),
    }
}

/// Writes the rendered report to the result file, or stdout when none is set
///
/// A result file always receives JSON so it can be loaded again later.
pub fn write_report(report: &Report, config: &OutputConfig) -> OutputResult<()> {
    match &config.result_path {
        Some(path) => {
            let json = format_json_report(report)?;
            std::fs::write(Path::new(path), json)?;
            tracing::info!("Report written to {}", path);
        }
        None => {
            let rendered = render_report(report, config)?;
            print!("{}", rendered);
        }
    }
    Ok(())
}
